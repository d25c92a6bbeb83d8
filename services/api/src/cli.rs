use crate::demo::{run_demo, run_verify, DemoArgs, VerifyArgs};
use crate::server;
use agriflow::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "AgriFlow",
    about = "Run the AgriFlow lending desk or walk through a loan from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk one loan from application to repayment and print every stage
    Demo(DemoArgs),
    /// Check a market claim against live search results
    Verify(VerifyArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Verify(args) => run_verify(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let cli = Cli::try_parse_from(["agriflow-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn demo_flags_parse() {
        let cli = Cli::try_parse_from(["agriflow-api", "demo", "--offline", "--fast", "--seed", "7"])
            .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => {
                assert!(args.offline);
                assert!(args.fast);
                assert_eq!(args.seed, Some(7));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verify_joins_the_query_words() {
        let cli = Cli::try_parse_from([
            "agriflow-api",
            "verify",
            "Potato",
            "prices",
            "in",
            "Nyandarua",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Verify(args)) => assert_eq!(args.query(), "Potato prices in Nyandarua"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
