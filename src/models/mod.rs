pub mod courier;
pub mod location;
pub mod package;
