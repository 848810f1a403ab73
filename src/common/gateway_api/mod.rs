pub mod backends;
pub mod common;
pub mod gateways;
pub mod grpcroutes;
pub mod httproutes;
pub mod inferencepools;
pub mod listenersets;
pub mod referencegrants;
pub mod tcproutes;
pub mod tlsroutes;
