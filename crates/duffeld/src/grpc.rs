//! tonic gRPC surface: AuthService and SyncService over TCP
//!
//! Handlers own the streaming lifecycle (frame loops, chunk slicing,
//! subscription streams) and translate typed component errors into status
//! codes; the transfer pipeline itself lives in `duffel_sync::engine`.

use anyhow::Result;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, TcpListenerStream};
use tokio_stream::{Stream, StreamExt};
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};
use tracing::{error, info, warn};

use duffel_auth::{AuthGate, CredentialVerifier, TokenService};
use duffel_core::proto::{
    auth_service_server::{AuthService, AuthServiceServer},
    sync_service_server::{SyncService, SyncServiceServer},
    Empty, FileChunk, FileList, FileRequest, FileUpdate, LoginRequest, LoginResponse,
    RefreshRequest, UploadResponse,
};
use duffel_crypto::{CodecError, KeyStore};
use duffel_sync::{
    base_name, EngineError, NotificationBus, StoreError, TransferEngine, DOWNLOAD_CHUNK_SIZE,
};

// ── AuthService ────────────────────────────────────────────────────────────

pub struct AuthApi {
    verifier: Arc<dyn CredentialVerifier>,
    tokens: Arc<TokenService>,
    keys: Arc<KeyStore>,
}

impl AuthApi {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        tokens: Arc<TokenService>,
        keys: Arc<KeyStore>,
    ) -> Self {
        Self {
            verifier,
            tokens,
            keys,
        }
    }

    fn token_pair(&self, username: &str) -> LoginResponse {
        LoginResponse {
            token: self.tokens.issue_access(username),
            refresh_token: self.tokens.issue_refresh(username),
        }
    }
}

#[tonic::async_trait]
impl AuthService for AuthApi {
    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();

        if !self.verifier.verify(&req.username, &req.password) {
            warn!(user = %req.username, "login rejected");
            return Err(Status::unauthenticated("invalid credentials"));
        }

        // Subsequent uploads must find a key
        self.keys.ensure_for(&req.username).await.map_err(|e| {
            error!(user = %req.username, error = %e, "key provisioning failed");
            Status::internal("key provisioning failed")
        })?;

        info!(user = %req.username, "login");
        Ok(Response::new(self.token_pair(&req.username)))
    }

    async fn refresh_token(
        &self,
        request: Request<RefreshRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();

        let claims = self
            .tokens
            .validate(&req.refresh_token)
            .map_err(|_| Status::unauthenticated("refresh token invalid or expired"))?;

        // The old refresh token stays valid until it expires (stateless
        // refresh, no rotation)
        info!(user = %claims.username, "token refreshed");
        Ok(Response::new(self.token_pair(&claims.username)))
    }
}

// ── SyncService ────────────────────────────────────────────────────────────

pub struct SyncApi {
    gate: AuthGate,
    engine: Arc<TransferEngine>,
    bus: Arc<NotificationBus>,
}

impl SyncApi {
    pub fn new(gate: AuthGate, engine: Arc<TransferEngine>, bus: Arc<NotificationBus>) -> Self {
        Self { gate, engine, bus }
    }
}

#[tonic::async_trait]
impl SyncService for SyncApi {
    async fn upload_file(
        &self,
        request: Request<Streaming<FileChunk>>,
    ) -> Result<Response<UploadResponse>, Status> {
        let username = self.gate.username_of(&request)?;

        // A key miss after login is server state corruption, not a client
        // error
        let key = self.engine.user_key(&username).map_err(|e| {
            error!(user = %username, error = %e, "user key missing after login");
            Status::internal("user key unavailable")
        })?;

        let mut stream = request.into_inner();
        let mut filename: Option<String> = None;
        let mut wire: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if filename.is_none() {
                filename = Some(require_bare_name(&chunk.filename)?.to_string());
            }
            wire.extend_from_slice(&chunk.data);
        }

        let filename =
            filename.ok_or_else(|| Status::invalid_argument("empty upload stream"))?;

        let bytes = self
            .engine
            .commit_upload(&username, &filename, &key, &wire)
            .map_err(engine_status)?;

        info!(user = %username, file = %filename, bytes, "upload complete");
        Ok(Response::new(UploadResponse {
            message: format!("{filename}: {bytes} bytes stored"),
        }))
    }

    type DownloadFileStream = Pin<Box<dyn Stream<Item = Result<FileChunk, Status>> + Send>>;

    async fn download_file(
        &self,
        request: Request<FileRequest>,
    ) -> Result<Response<Self::DownloadFileStream>, Status> {
        let username = self.gate.username_of(&request)?;
        let req = request.into_inner();

        let wire = self
            .engine
            .prepare_download(&username, &req.filename)
            .map_err(engine_status)?;

        info!(
            user = %username,
            file = %req.filename,
            wire_bytes = wire.len(),
            "download started"
        );

        // Fixed-size frames; the last one may be short. Each frame mirrors
        // the requested bare name.
        let frames: Vec<Result<FileChunk, Status>> = wire
            .chunks(DOWNLOAD_CHUNK_SIZE)
            .map(|slice| {
                Ok(FileChunk {
                    filename: req.filename.clone(),
                    data: slice.to_vec(),
                })
            })
            .collect();

        Ok(Response::new(Box::pin(tokio_stream::iter(frames))))
    }

    async fn list_files(&self, request: Request<Empty>) -> Result<Response<FileList>, Status> {
        let username = self.gate.username_of(&request)?;

        let filenames = self.engine.list(&username).map_err(engine_status)?;
        Ok(Response::new(FileList { filenames }))
    }

    async fn delete_file(
        &self,
        request: Request<FileRequest>,
    ) -> Result<Response<UploadResponse>, Status> {
        let username = self.gate.username_of(&request)?;
        let req = request.into_inner();

        self.engine
            .delete(&username, &req.filename)
            .map_err(engine_status)?;

        info!(user = %username, file = %req.filename, "delete complete");
        Ok(Response::new(UploadResponse {
            message: format!("{} deleted", req.filename),
        }))
    }

    type SyncUpdatesStream = Pin<Box<dyn Stream<Item = Result<FileUpdate, Status>> + Send>>;

    async fn sync_updates(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<Self::SyncUpdatesStream>, Status> {
        let username = self.gate.username_of(&request)?;

        let rx = self.bus.subscribe();
        info!(user = %username, "updates subscription opened");

        // Dropping the stream on peer disconnect drops the receiver and
        // unsubscribes. A subscriber that lags past the bus capacity loses
        // the oldest events and continues.
        let stream = BroadcastStream::new(rx).filter_map(move |item| match item {
            Ok(event) => Some(Ok(FileUpdate {
                filename: event.filename,
                action: event.action.as_str().to_string(),
            })),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                warn!(user = %username, missed, "slow subscriber; events dropped");
                None
            }
        });

        Ok(Response::new(Box::pin(stream)))
    }
}

// ── error translation ──────────────────────────────────────────────────────

/// Wire frames carry bare names; anything with a separator (or an empty
/// name) never reaches the filesystem.
fn require_bare_name(name: &str) -> Result<&str, Status> {
    match base_name(name) {
        Some(base) if base == name => Ok(base),
        _ => Err(Status::invalid_argument(format!(
            "filename {name:?} must be a bare file name"
        ))),
    }
}

fn engine_status(err: EngineError) -> Status {
    match &err {
        EngineError::Store(StoreError::NotFound(name)) => {
            Status::not_found(format!("file {name:?} does not exist"))
        }
        EngineError::Store(StoreError::InvalidName(_) | StoreError::InvalidUser(_)) => {
            Status::invalid_argument(err.to_string())
        }
        EngineError::Codec(CodecError::MalformedCipher(_)) => {
            error!("stored ciphertext corrupt: {err}");
            Status::internal("stored data corrupt")
        }
        _ => {
            error!("transfer failed: {err}");
            Status::internal("transfer failed")
        }
    }
}

// ── server ─────────────────────────────────────────────────────────────────

/// Run both services on the given listener until the process exits.
pub async fn serve(listener: TcpListener, auth: AuthApi, sync: SyncApi) -> Result<()> {
    let incoming = TcpListenerStream::new(listener);

    Server::builder()
        .add_service(AuthServiceServer::new(auth))
        .add_service(SyncServiceServer::new(sync))
        .serve_with_incoming(incoming)
        .await
        .map_err(|e| anyhow::anyhow!("gRPC server error: {e}"))
}
