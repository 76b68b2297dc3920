pub mod instance;
pub mod list;
pub mod network;
pub mod refresh;
pub mod token;
