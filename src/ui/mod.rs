pub mod input;
pub mod layout;
pub mod peer_list;
pub mod transcript;
