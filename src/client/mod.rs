pub mod memory;
pub mod nomad;

pub use memory::InMemoryNomadClient;
pub use nomad::{
    AllocatedResources, Allocation, AllocationResources, AllocationStub, ClientError, Job,
    NetworkResource, Node, NomadClient, NomadClientTrait, Port, Service, SharedResources, Task,
    TaskGroup,
};
