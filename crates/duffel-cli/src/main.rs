//! duffel: client for the duffel synchronization daemon
//!
//! Commands:
//!   login <username>     - authenticate and store the token pair
//!   upload <path>        - compress and upload a local file
//!   download <name>      - download and decompress a stored file
//!   list                 - list the stored namespace
//!   delete <name>        - delete a stored file
//!   watch                - stream namespace change notifications
//!
//! Tokens live in credentials.json next to the working directory (or
//! --credentials). On an expired access token the client refreshes once and
//! retries.

mod creds;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request};

use duffel_core::proto::{
    auth_service_client::AuthServiceClient, sync_service_client::SyncServiceClient, Empty,
    FileChunk, FileRequest, LoginRequest, RefreshRequest,
};
use duffel_crypto::codec;

/// Frame payload size for streaming uploads.
const UPLOAD_CHUNK_SIZE: usize = 1024;

/// Stored names carry this suffix; the client presents them stripped.
const ENC_SUFFIX: &str = ".enc";

#[derive(Parser, Debug)]
#[command(name = "duffel", version, about = "duffel file synchronization client")]
struct Cli {
    /// Server endpoint
    #[arg(long, env = "DUFFEL_SERVER", default_value = "http://127.0.0.1:50051")]
    server: String,

    /// Credentials file written by `login`
    #[arg(long, env = "DUFFEL_CREDENTIALS", default_value = "credentials.json")]
    credentials: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate and store the token pair
    Login {
        username: String,
        /// Password (prefer the env var over the flag in shared shells)
        #[arg(long, env = "DUFFEL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Compress and upload a local file
    Upload {
        /// Local file path; the stored name is its base name
        path: PathBuf,
    },

    /// Download a stored file
    Download {
        /// Stored name (without .enc)
        name: String,
        /// Destination path (default: the name, in the current directory)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// List the stored namespace
    List,

    /// Delete a stored file
    Delete {
        /// Stored name (without .enc)
        name: String,
    },

    /// Stream namespace change notifications until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let channel = Endpoint::from_shared(cli.server.clone())?
        .connect()
        .await
        .with_context(|| format!("connecting to {}", cli.server))?;

    match cli.command {
        Commands::Login { username, password } => {
            cmd_login(&channel, &cli.credentials, &username, &password).await
        }
        command => {
            let mut session = Session::open(channel, cli.credentials)?;
            match command {
                Commands::Upload { path } => cmd_upload(&mut session, &path).await,
                Commands::Download { name, out } => cmd_download(&mut session, &name, out).await,
                Commands::List => cmd_list(&mut session).await,
                Commands::Delete { name } => cmd_delete(&mut session, &name).await,
                Commands::Watch => cmd_watch(&mut session).await,
                Commands::Login { .. } => unreachable!("handled above"),
            }
        }
    }
}

// ── session ────────────────────────────────────────────────────────────────

/// An authenticated connection plus the on-disk token pair.
struct Session {
    channel: Channel,
    creds_path: PathBuf,
    creds: creds::Credentials,
}

impl Session {
    fn open(channel: Channel, creds_path: PathBuf) -> Result<Self> {
        let creds = creds::load(&creds_path)?;
        Ok(Self {
            channel,
            creds_path,
            creds,
        })
    }

    fn sync(&self) -> SyncServiceClient<Channel> {
        SyncServiceClient::new(self.channel.clone())
    }

    fn auth(&self) -> AuthServiceClient<Channel> {
        AuthServiceClient::new(self.channel.clone())
    }

    fn authed<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        request.metadata_mut().insert(
            "authorization",
            self.creds.token.parse().expect("token is ASCII"),
        );
        request
    }

    /// Swap the stored pair for a fresh one. The daemon's refresh is
    /// stateless, so this can run any number of times before the refresh
    /// token itself expires.
    async fn refresh(&mut self) -> Result<()> {
        let response = self
            .auth()
            .refresh_token(RefreshRequest {
                refresh_token: self.creds.refresh_token.clone(),
            })
            .await
            .map_err(|s| anyhow::anyhow!("session expired, log in again: {}", s.message()))?
            .into_inner();

        self.creds = creds::Credentials {
            token: response.token,
            refresh_token: response.refresh_token,
        };
        creds::save(&self.creds_path, &self.creds)
    }
}

fn needs_refresh(status: &tonic::Status) -> bool {
    status.code() == Code::Unauthenticated
}

fn display_name(stored: &str) -> &str {
    stored.strip_suffix(ENC_SUFFIX).unwrap_or(stored)
}

// ── commands ───────────────────────────────────────────────────────────────

async fn cmd_login(
    channel: &Channel,
    creds_path: &Path,
    username: &str,
    password: &str,
) -> Result<()> {
    let mut auth = AuthServiceClient::new(channel.clone());
    let response = auth
        .login(LoginRequest {
            username: username.into(),
            password: password.into(),
        })
        .await
        .map_err(|s| anyhow::anyhow!("login failed: {}", s.message()))?
        .into_inner();

    creds::save(
        creds_path,
        &creds::Credentials {
            token: response.token,
            refresh_token: response.refresh_token,
        },
    )?;

    println!("logged in as {username}");
    Ok(())
}

async fn cmd_upload(session: &mut Session, path: &Path) -> Result<()> {
    let contents =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("path has no usable file name")?
        .to_string();

    let wire = codec::compress(&contents)?;
    let frames: Vec<FileChunk> = wire
        .chunks(UPLOAD_CHUNK_SIZE)
        .map(|slice| FileChunk {
            filename: name.clone(),
            data: slice.to_vec(),
        })
        .collect();

    let pb = ProgressBar::new(wire.len() as u64);
    pb.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {bytes}/{total_bytes}",
    )?);

    let send = |session: &Session, pb: ProgressBar| {
        let frames = frames.clone();
        let stream = tokio_stream::iter(
            frames
                .into_iter()
                .inspect(move |frame| pb.inc(frame.data.len() as u64)),
        );
        let request = session.authed(stream);
        let mut sync = session.sync();
        async move { sync.upload_file(request).await }
    };

    let response = match send(session, pb.clone()).await {
        Ok(response) => response,
        Err(status) if needs_refresh(&status) => {
            session.refresh().await?;
            pb.set_position(0);
            send(session, pb.clone())
                .await
                .map_err(|s| anyhow::anyhow!("upload failed: {}", s.message()))?
        }
        Err(status) => anyhow::bail!("upload failed: {}", status.message()),
    };

    pb.finish_and_clear();
    println!("{}", response.into_inner().message);
    Ok(())
}

async fn cmd_download(session: &mut Session, name: &str, out: Option<PathBuf>) -> Result<()> {
    let request = FileRequest {
        filename: name.into(),
    };

    let response = match session.sync().download_file(session.authed(request.clone())).await {
        Ok(response) => response,
        Err(status) if needs_refresh(&status) => {
            session.refresh().await?;
            session
                .sync()
                .download_file(session.authed(request))
                .await
                .map_err(|s| anyhow::anyhow!("download failed: {}", s.message()))?
        }
        Err(status) => anyhow::bail!("download failed: {}", status.message()),
    };

    let mut stream = response.into_inner();
    let mut wire = Vec::new();
    while let Some(frame) = stream
        .message()
        .await
        .map_err(|s| anyhow::anyhow!("download stream: {}", s.message()))?
    {
        wire.extend_from_slice(&frame.data);
    }

    let plain = codec::decompress(&wire)?;
    let out = out.unwrap_or_else(|| PathBuf::from(name));
    std::fs::write(&out, &plain).with_context(|| format!("writing {}", out.display()))?;

    println!("{}  {} bytes", out.display(), plain.len());
    Ok(())
}

async fn cmd_list(session: &mut Session) -> Result<()> {
    let response = match session.sync().list_files(session.authed(Empty {})).await {
        Ok(response) => response,
        Err(status) if needs_refresh(&status) => {
            session.refresh().await?;
            session
                .sync()
                .list_files(session.authed(Empty {}))
                .await
                .map_err(|s| anyhow::anyhow!("list failed: {}", s.message()))?
        }
        Err(status) => anyhow::bail!("list failed: {}", status.message()),
    };

    for stored in response.into_inner().filenames {
        println!("{}", display_name(&stored));
    }
    Ok(())
}

async fn cmd_delete(session: &mut Session, name: &str) -> Result<()> {
    let request = FileRequest {
        filename: name.into(),
    };

    let response = match session.sync().delete_file(session.authed(request.clone())).await {
        Ok(response) => response,
        Err(status) if needs_refresh(&status) => {
            session.refresh().await?;
            session
                .sync()
                .delete_file(session.authed(request))
                .await
                .map_err(|s| anyhow::anyhow!("delete failed: {}", s.message()))?
        }
        Err(status) => anyhow::bail!("delete failed: {}", status.message()),
    };

    println!("{}", response.into_inner().message);
    Ok(())
}

async fn cmd_watch(session: &mut Session) -> Result<()> {
    let response = match session.sync().sync_updates(session.authed(Empty {})).await {
        Ok(response) => response,
        Err(status) if needs_refresh(&status) => {
            session.refresh().await?;
            session
                .sync()
                .sync_updates(session.authed(Empty {}))
                .await
                .map_err(|s| anyhow::anyhow!("watch failed: {}", s.message()))?
        }
        Err(status) => anyhow::bail!("watch failed: {}", status.message()),
    };

    println!("watching for changes (ctrl-c to stop)");
    let mut stream = response.into_inner();
    while let Some(update) = stream
        .message()
        .await
        .map_err(|s| anyhow::anyhow!("watch stream: {}", s.message()))?
    {
        println!("{:>8}  {}", update.action, display_name(&update.filename));
    }

    Ok(())
}
