// Domain layer: records and repository ports. Adapters implement the ports, core depends on them.

pub mod model;
pub mod ports;
