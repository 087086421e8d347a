//! Wire record codec.
//!
//! Builds the small control structures that parameterize every request
//! (option list, control list, open control block, keys) and converts
//! between records and the host's record buffers.

pub mod batch;
pub mod ctll;
pub mod feedback;
pub mod key;
pub mod optl;
pub mod ufcb;

pub use batch::{check_record_length, decode_record_batch, encode_record_batch};
pub use ctll::{encode_control_list, ControlEntry};
pub use feedback::{FileType, IoFeedback, OpenFeedback};
pub use key::{encode_key, EncodedKey};
pub use optl::{encode_option_list, DataPresence, OperationCode, PositionType, ShareMode};
pub use ufcb::Ufcb;
