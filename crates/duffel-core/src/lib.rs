pub mod config;

pub use config::DuffelConfig;

/// Generated gRPC types and service traits (from duffel.proto)
pub mod proto {
    tonic::include_proto!("duffel");
}
