use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    /// Which SKU letter table to use. "v1" and "v2" differ in the meaning of
    /// the C and D prefixes after the menu recode.
    pub sku_table_version: String,
    /// SKU prefixes that mark a main dish.
    pub main_dish_prefixes: Vec<String>,
    /// Name keywords used when a row has no SKU.
    pub main_dish_keywords: Vec<String>,
    /// Item types that wrap a combo and never count as a dish themselves.
    pub combo_wrapper_types: Vec<String>,
    pub delivery_keywords: Vec<String>,
    pub takeout_keywords: Vec<String>,
    pub dine_in_keywords: Vec<String>,
    /// Ordered name-based category fallbacks for rows without a usable SKU.
    pub name_rules: Vec<NameRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        CategoryConfig {
            sku_table_version: "v1".to_string(),
            main_dish_prefixes: vec!["A".to_string(), "B".to_string()],
            main_dish_keywords: vec![
                "麵".to_string(),
                "飯".to_string(),
                "noodle".to_string(),
                "rice".to_string(),
            ],
            combo_wrapper_types: vec![
                "combo".to_string(),
                "套餐".to_string(),
                "set meal".to_string(),
            ],
            delivery_keywords: vec![
                "外送".to_string(),
                "delivery".to_string(),
                "ubereats".to_string(),
                "uber eats".to_string(),
                "foodpanda".to_string(),
            ],
            takeout_keywords: vec![
                "外帶".to_string(),
                "takeout".to_string(),
                "take out".to_string(),
                "自取".to_string(),
                "pickup".to_string(),
                "pick up".to_string(),
            ],
            dine_in_keywords: vec![
                "內用".to_string(),
                "dine in".to_string(),
                "dine-in".to_string(),
            ],
            name_rules: default_name_rules(),
        }
    }
}

fn default_name_rules() -> Vec<NameRule> {
    let rule = |category: &str, keywords: &[&str]| NameRule {
        category: category.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    };
    vec![
        rule("Soup Noodle", &["湯麵"]),
        rule("Dry Noodle & Rice", &["乾麵", "拌麵", "飯", "rice"]),
        rule("Soup Noodle", &["麵", "noodle"]),
        rule("Vegetable", &["青菜", "時蔬"]),
        rule("Soup", &["湯", "soup"]),
        rule("Drink", &["飲", "茶", "可樂", "汽水", "drink"]),
        rule("Set Meal", &["套餐", "set"]),
    ]
}

/// SKU first-letter -> category lookup for one table version.
#[derive(Debug, Clone)]
pub struct SkuCategoryMap {
    table: HashMap<char, &'static str>,
}

impl SkuCategoryMap {
    pub fn for_version(version: &str) -> Result<Self> {
        let mut table = HashMap::from([
            ('A', "Soup Noodle"),
            ('B', "Dry Noodle & Rice"),
            ('E', "Soup"),
            ('F', "Drink"),
            ('S', "Set Meal"),
        ]);
        match version.trim().to_lowercase().as_str() {
            "v1" => {
                table.insert('C', "Vegetable");
                table.insert('D', "Side Dish");
            }
            "v2" => {
                table.insert('C', "Side Dish");
                table.insert('D', "Vegetable");
            }
            other => bail!("Unknown SKU table version: '{}'", other),
        }
        Ok(SkuCategoryMap { table })
    }

    pub fn lookup(&self, sku: &str) -> Option<&'static str> {
        let first = sku.trim().chars().next()?;
        self.table
            .get(&first.to_ascii_uppercase())
            .copied()
    }
}
