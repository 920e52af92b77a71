pub mod case;
pub mod case_file;
pub mod case_message;
pub mod profile;

pub use case::*;
pub use case_file::*;
pub use case_message::*;
pub use profile::*;
