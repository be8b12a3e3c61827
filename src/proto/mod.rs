// Generated proto modules will be included here after build
// Run `cargo build` to generate the proto code

pub mod inventory {
    include!("fireworks.inventory.rs");
}

pub mod health {
    include!("grpc.health.v1.rs");
}
