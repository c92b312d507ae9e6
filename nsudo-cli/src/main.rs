#[cfg(target_os = "windows")]
fn main() {
    std::process::exit(imp::run());
}

#[cfg(not(target_os = "windows"))]
fn main() {
    eprintln!("nsudo only runs on Windows hosts.");
    std::process::exit(nsudo_cli::EXIT_FAILURE);
}

#[cfg(target_os = "windows")]
mod imp {
    use nsudo_cli::EXIT_FAILURE;
    use nsudo_cli::HELP_TEXT;
    use nsudo_cli::error_message;
    use nsudo_cli::version_line;
    use nsudo_core::CallerContext;
    use nsudo_core::Outcome;
    use tracing_subscriber::EnvFilter;

    const LOG_ENV_VAR: &str = "NSUDO_LOG";

    pub(crate) fn run() -> i32 {
        init_logging();

        let ctx = match CallerContext::capture() {
            Ok(ctx) => ctx,
            Err(err) => {
                eprintln!("{}", error_message(&err));
                return EXIT_FAILURE;
            }
        };

        let raw = nsudo_core::raw_command_line();
        match nsudo_core::run(&ctx, &raw) {
            Ok(Outcome::Help) => {
                print!("{HELP_TEXT}");
                0
            }
            Ok(Outcome::Version) => {
                println!("{}", version_line());
                0
            }
            Ok(Outcome::Launched(disposition)) => {
                tracing::debug!(?disposition, "launch complete");
                0
            }
            Err(err) => {
                eprintln!("{}", error_message(&err));
                EXIT_FAILURE
            }
        }
    }

    fn init_logging() {
        let filter =
            EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("error"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
