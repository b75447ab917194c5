pub mod add;
pub mod common;
pub mod config;
pub mod delete;
pub mod edit;
pub mod list;
pub mod pin;
pub mod show;
pub mod status;
pub mod sync;
pub mod tag;

pub use add::run_add;
pub use config::run_config;
pub use delete::run_delete;
pub use edit::run_edit;
pub use list::run_list;
pub use pin::run_pin;
pub use show::run_show;
pub use status::run_status;
pub use sync::run_sync;
pub use tag::run_tag;
