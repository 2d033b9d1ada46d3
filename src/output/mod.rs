pub mod async_writer;

pub use async_writer::{format_record, spawn_url_writer, Format};
