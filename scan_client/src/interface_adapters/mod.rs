pub mod capture;
pub mod protocol;
pub mod sink;
pub mod status;
pub mod transport;
