pub mod gateway;
pub mod memparse;
pub mod retry;

pub use gateway::{ContainerDescriptor, CreateSpec, DockerGateway, MountSpec};
pub use memparse::parse_mem_limit;
