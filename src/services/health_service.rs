use std::sync::Arc;
use tonic::{Request, Response, Status};

use crate::proto::health::{
    health_server::Health, HealthCheckRequest, HealthCheckResponse,
    health_check_response::ServingStatus,
};
use crate::sync::SyncEngine;

/// Serving only when a table store is configured; the server keeps running
/// without one so clients can show the configuration problem.
pub struct HealthServiceImpl {
    engine: Arc<SyncEngine>,
}

impl HealthServiceImpl {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    fn status(&self) -> ServingStatus {
        if self.engine.is_configured() {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        }
    }
}

#[tonic::async_trait]
impl Health for HealthServiceImpl {
    async fn check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(HealthCheckResponse {
            status: self.status().into(),
        }))
    }

    type WatchStream = tokio_stream::wrappers::ReceiverStream<Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let status = self.status();

        tokio::spawn(async move {
            let _ = tx.send(Ok(HealthCheckResponse {
                status: status.into(),
            })).await;
        });

        Ok(Response::new(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}
