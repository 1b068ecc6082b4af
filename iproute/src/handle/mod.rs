pub mod addr;
pub mod link;
pub mod nat;
pub mod neigh;
pub mod netns;
pub mod routing;
