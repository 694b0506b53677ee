mod exchanger_database;

pub use exchanger_database::ExchangerDatabase;
