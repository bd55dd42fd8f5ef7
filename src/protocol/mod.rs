pub mod messages;
pub mod packet;
pub mod topic;
