use terakoya_timeline::app::{Command, RunOptions};

const HELP: &str = "Terakoya timeline - browse and post to the community timeline.

  --pages N            Print up to N pages of the timeline (default 1)
  --post TEXT          Publish a post as the configured member
  --like POST_ID       Toggle your like on a post
  --comments POST_ID   Print a post with its comments
  --sign-in UUID NAME  Save the member to post and react as
  --offline            Use built-in sample data instead of the API
  --config FILE        Read settings from FILE instead of the default path
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(err) = terakoya_timeline::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

/// `Ok(None)` means a flag was fully handled here.
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<RunOptions>, String> {
    let mut options = RunOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("terakoya-timeline {}", terakoya_timeline::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(None);
            }
            "--offline" => options.offline = true,
            "--config" => {
                let path = args.next().ok_or("--config needs a file path")?;
                options.config_file = Some(path.into());
            }
            "--pages" => {
                let value = args.next().ok_or("--pages needs a number")?;
                let pages = value
                    .parse::<usize>()
                    .map_err(|_| format!("--pages expects a number, got {value:?}"))?;
                options.command = Command::Feed { pages };
            }
            "--post" => {
                let texts = args.next().ok_or("--post needs the text to publish")?;
                options.command = Command::Post { texts };
            }
            "--like" => {
                let post_id = args.next().ok_or("--like needs a post id")?;
                options.command = Command::Like { post_id };
            }
            "--comments" => {
                let post_id = args.next().ok_or("--comments needs a post id")?;
                options.command = Command::Comments { post_id };
            }
            "--sign-in" => {
                let uuid = args.next().ok_or("--sign-in needs a member uuid")?;
                let name = args.next().ok_or("--sign-in needs a display name")?;
                options.command = Command::SignIn { uuid, name };
            }
            other => return Err(format!("unknown argument {other:?}")),
        }
    }
    Ok(Some(options))
}
