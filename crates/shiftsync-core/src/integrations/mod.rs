pub mod homebase;
pub mod mock;
pub mod oauth;
pub mod traits;

pub use homebase::HomebaseClient;
pub use traits::{CalendarAdapter, ShiftSource};
