pub mod assign;
pub mod dedup;
pub mod embed;
pub mod status;
