// Generated protobuf + gRPC types from proto/*.proto via tonic-build.
// The module hierarchy must match the protobuf package paths:
//   realtime.v1 -> proto::realtime::v1
//   auth.v1     -> proto::auth::v1

pub mod realtime {
    pub mod v1 {
        tonic::include_proto!("realtime.v1");
    }
}

pub mod auth {
    pub mod v1 {
        tonic::include_proto!("auth.v1");
    }
}

// Re-export for convenient access
pub use auth::v1 as authv1;
pub use realtime::v1 as delivery;
