pub mod browser;
pub mod extract;
pub mod loader;
pub mod schema;
pub mod snapshot;
pub mod traits;
pub mod types;

pub use browser::ChromeDriver;
