pub mod exec;
pub mod tolerate;
