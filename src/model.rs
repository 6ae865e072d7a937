pub mod object;
pub mod response;
