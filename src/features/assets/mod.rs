pub mod handler;

pub use handler::create_assets_router;
