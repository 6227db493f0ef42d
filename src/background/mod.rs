pub mod ingester;

pub use ingester::BackgroundIngester;
