pub mod csv_io;
pub mod error;
pub mod formatter;
