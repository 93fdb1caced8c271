/// Database configuration and connection management
pub mod database;

/// Fee, tax, teacher split and retry settings loaded from config.toml
pub mod rates;
