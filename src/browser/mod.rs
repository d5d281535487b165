pub mod chrome;
pub mod session;

pub use chrome::{ChromeDriver, LaunchOptions};
pub use session::{BoundingBox, ElementQuery, ElementState, NavigationResponse, PageSession};
