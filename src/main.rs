//! Skybot CLI entry point.
//!
//! Provides `dm`, `random` and `random reply`. Each run builds one client,
//! performs one delivery, prints the report to stdout and exits non-zero on
//! failure.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use skybot::client::xrpc::XrpcClient;
use skybot::config::Config;
use skybot::delivery::{
    Credentials, Delivery, DeliveryError, DeliveryReport, DirectMessage, RngIndex,
};
use skybot::logging;

/// Send direct messages and posts on the AT Protocol.
#[derive(Parser)]
#[command(name = "skybot", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Send a markdown direct message to one or more accounts.
    Dm {
        /// Markdown message body.
        post: String,
        /// Recipient handle or DID. Repeat or list several.
        #[arg(long = "id", required = true, num_args = 1..)]
        identifiers: Vec<String>,
        /// `at://` URI of a record to embed.
        #[arg(short = 'r', long)]
        embed_record: Option<String>,
        /// CID of the embedded record.
        #[arg(short = 'c', long)]
        embed_record_cid: Option<String>,
        #[command(flatten)]
        connection: Connection,
    },
    /// Post a random line from a file.
    Random(RandomArgs),
}

/// Arguments of `random`.
#[derive(Args)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct RandomArgs {
    #[command(subcommand)]
    command: Option<RandomCommand>,
    /// Newline-delimited file of candidate posts.
    #[arg(required = true)]
    post_file: Option<PathBuf>,
    #[command(flatten)]
    selection: Selection,
    #[command(flatten)]
    connection: Connection,
}

/// Subcommands of `random`.
#[derive(Subcommand)]
enum RandomCommand {
    /// Reply to an account's latest post with a random line.
    Reply {
        /// Newline-delimited file of candidate posts.
        post_file: PathBuf,
        /// Handle or DID whose latest post is replied to.
        identifier: String,
        #[command(flatten)]
        selection: Selection,
        #[command(flatten)]
        connection: Connection,
    },
}

/// Line selection options.
#[derive(Args)]
struct Selection {
    /// Seed for deterministic line selection.
    #[arg(long)]
    seed: Option<u64>,
}

impl Selection {
    fn source(&self) -> RngIndex {
        self.seed.map_or_else(RngIndex::from_entropy, RngIndex::seeded)
    }
}

/// Account and server options shared by every command.
#[derive(Args)]
struct Connection {
    /// Handle, DID or email of the sending account.
    #[arg(short, long)]
    username: Option<String>,
    /// App password of the sending account.
    #[arg(short, long)]
    password: Option<String>,
    /// PDS URL (default `https://bsky.social`).
    #[arg(short, long)]
    instance_url: Option<String>,
    /// Log debug output to stderr.
    #[arg(short, long)]
    verbose: bool,
}

impl Connection {
    fn credentials(&self) -> Credentials {
        Credentials::new(
            self.username.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
        )
    }
}

impl Command {
    fn connection(&self) -> &Connection {
        match self {
            Self::Dm { connection, .. } => connection,
            Self::Random(args) => match &args.command {
                Some(RandomCommand::Reply { connection, .. }) => connection,
                None => &args.connection,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_cli(cli.command.connection().verbose);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        }
    });

    match run(cli.command, cancel).await {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<DeliveryError>() {
                Some(failure) => eprintln!("{}: {failure}", failure.kind()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Build the client and run the selected pipeline.
async fn run(command: Command, cancel: CancellationToken) -> anyhow::Result<DeliveryReport> {
    let config = Config::load().context("failed to load configuration")?;
    let connection = command.connection();
    let instance_url = config.instance_url(connection.instance_url.as_deref())?;
    let credentials = connection.credentials();

    let client = XrpcClient::new(&instance_url, config.chat_proxy.clone(), &config.http);
    let delivery = Delivery::with_cancellation(&client, cancel);

    let report = match command {
        Command::Dm {
            post,
            identifiers,
            embed_record,
            embed_record_cid,
            ..
        } => {
            let message = DirectMessage {
                text: post,
                recipients: identifiers,
                embed_uri: embed_record,
                embed_cid: embed_record_cid,
            };
            delivery.send_direct_message(&credentials, &message).await?
        }
        Command::Random(args) => match args.command {
            Some(RandomCommand::Reply {
                post_file,
                identifier,
                selection,
                ..
            }) => {
                let mut source = selection.source();
                delivery
                    .reply_random(&credentials, &post_file, &identifier, &mut source)
                    .await?
            }
            None => {
                let post_file = args
                    .post_file
                    .context("a post file is required")?;
                let mut source = args.selection.source();
                delivery
                    .post_random(&credentials, &post_file, &mut source)
                    .await?
            }
        },
    };
    Ok(report)
}
