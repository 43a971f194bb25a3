pub mod cache;

pub use cache::FrameCache;
