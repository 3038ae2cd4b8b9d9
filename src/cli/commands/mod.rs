mod ingest;
mod status;

pub use ingest::IngestArgs;

pub use ingest::handle_ingest;
pub use status::handle_status;
