pub mod handler;
pub mod overlay;

pub use handler::create_decor_router;
