pub mod external;
pub mod remote;
