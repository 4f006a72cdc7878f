pub mod archive;
pub mod handler;

pub use archive::{ArchiveExporter, ExportedArchive, archive_file_name};
pub use handler::create_export_router;
