pub mod csv_file;
pub mod json_file;
pub mod scanner;

pub use csv_file::{read_csv_table, CsvParse};
pub use json_file::{read_json_orders, JsonOrders};
pub use scanner::{collect_candidates, newest_modification, CandidateFile};
