//! subfetch - find, download and convert subtitles for movie files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use directories::ProjectDirs;

use subfetch_core::config::{ConfigManager, Settings};
use subfetch_core::downloader::{FileChecksumCache, Session, Stage, SubtitleDownloader};
use subfetch_core::engines::{EngineRegistry, ReqwestClient};
use subfetch_core::logging::{init_tracing, init_tracing_with_file};
use subfetch_core::movie_info::FfprobeMovieInfo;
use subfetch_core::scan::find_movies;
use subfetch_core::subtitles::{encoding_for_label, ConversionOptions, FormatRegistry, SubtitleConverter};

const CONFIG_FILE_NAME: &str = "settings.toml";
const CACHE_FILE_NAME: &str = "checksums.json";

#[derive(Parser, Debug)]
#[command(name = "subfetch", version, about = "Download and convert subtitles for movie files")]
struct Cli {
    /// Configuration file (created with defaults when missing)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search, download and place subtitles next to movies
    Get {
        #[arg(required = true)]
        movies: Vec<PathBuf>,

        /// Language to search, repeatable (default: configured languages)
        #[arg(short, long = "lang")]
        languages: Vec<String>,

        /// Search only this engine
        #[arg(short, long)]
        engine: Option<String>,

        /// Candidate to download instead of the automatic pick
        #[arg(long)]
        pick: Option<usize>,

        /// List candidates without downloading
        #[arg(long)]
        list: bool,
    },

    /// Convert a subtitle file to another format
    Convert {
        source: PathBuf,

        /// Target format name (see `subfetch formats`)
        #[arg(short, long)]
        format: String,

        /// Output file (default: source with the format's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frame rate of the source (default: probed from the movie next to it)
        #[arg(long)]
        fps: Option<f64>,

        /// Frame rate to rescale to
        #[arg(long)]
        target_fps: Option<f64>,

        /// Shift every cue by this many seconds
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        delay: f64,

        /// Output encoding (default: keep the source encoding)
        #[arg(long)]
        encoding: Option<String>,
    },

    /// Print the format of a subtitle file
    Detect { file: PathBuf },

    /// List supported subtitle formats
    Formats,

    /// List download engines
    Engines,

    /// List movie files in a folder
    Scan { dir: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut manager = ConfigManager::new(&config_path);
    manager
        .load_or_create()
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    manager.ensure_dirs_exist()?;
    let settings = Arc::new(manager.into_settings());

    let level = settings.logging.level.more_verbose(cli.verbose);
    let _log_guard = match settings.logging.log_dir.trim() {
        "" => {
            init_tracing(level);
            None
        }
        dir => Some(init_tracing_with_file(level, Path::new(dir)).context("Failed to open log file")?),
    };
    tracing::debug!("subfetch {} using {}", subfetch_core::version(), config_path.display());

    match cli.command {
        Command::Get {
            movies,
            languages,
            engine,
            pick,
            list,
        } => {
            let downloader = build_downloader(settings.clone(), &config_path)?;
            let options = GetOptions {
                languages,
                engine,
                pick,
                list,
            };
            get(&downloader, &movies, &options)
        }
        Command::Convert {
            source,
            format,
            output,
            fps,
            target_fps,
            delay,
            encoding,
        } => {
            let converter = build_converter(&settings)?;
            let source_fps = fps.or_else(|| converter.determine_movie_fps(&source, &settings.general.movie_extensions));
            let fps_ratio = match target_fps {
                Some(target) => {
                    let source_fps = source_fps.ok_or_else(|| anyhow!("--target-fps needs the source frame rate (--fps)"))?;
                    target / source_fps
                }
                None => 1.0,
            };
            let options = ConversionOptions {
                source_fps,
                fps_ratio,
                delay_seconds: delay,
                target_encoding: encoding,
                remove_words: Vec::new(),
            };

            let report = converter
                .convert_subtitles(&source, &format, output.as_deref(), &options)
                .with_context(|| format!("Conversion of {} failed", source.display()))?;
            println!(
                "{} ({}) -> {} ({}), {} cues, {}",
                source.display(),
                report.source_format,
                report.target_path.display(),
                report.target_format,
                report.cues,
                report.encoding
            );
            Ok(())
        }
        Command::Detect { file } => {
            let converter = build_converter(&settings)?;
            match converter.detect_format(&file) {
                Some(format) => {
                    println!("{}", format);
                    Ok(())
                }
                None => bail!("{}: unrecognized subtitle format", file.display()),
            }
        }
        Command::Formats => {
            for format in FormatRegistry::new().descriptors() {
                println!("{:<10} {:<7} .{}", format.name, format.basis.name(), format.extension);
            }
            Ok(())
        }
        Command::Engines => {
            let registry = build_engines(&settings)?;
            let enabled = settings.engines.enabled_names();
            for meta in registry.metas() {
                let mark = if enabled.iter().any(|n| n.eq_ignore_ascii_case(meta.name)) { "*" } else { " " };
                println!("{} {:<14} {} ({})", mark, meta.name, meta.description, meta.site_url);
            }
            Ok(())
        }
        Command::Scan { dir } => {
            for movie in find_movies(&dir, &settings.scan, &settings.general.movie_extensions)? {
                println!("{}", movie.display());
            }
            Ok(())
        }
    }
}

struct GetOptions {
    languages: Vec<String>,
    engine: Option<String>,
    pick: Option<usize>,
    list: bool,
}

fn get(downloader: &SubtitleDownloader, movies: &[PathBuf], options: &GetOptions) -> Result<()> {
    let mut failed = 0;
    for movie in movies {
        match process_movie(downloader, movie, options) {
            Ok(Some(subtitles)) => println!("{} -> {}", movie.display(), subtitles.display()),
            Ok(None) => {}
            Err(e) => {
                eprintln!("{}: {:#}", movie.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} movie(s) failed", failed, movies.len());
    }
    Ok(())
}

fn process_movie(downloader: &SubtitleDownloader, movie: &Path, options: &GetOptions) -> Result<Option<PathBuf>> {
    if !movie.is_file() {
        bail!("file not found");
    }

    let session = downloader.new_session(movie);
    downloader.check_write_permissions(&session)?;

    let session = run_pipeline(downloader, session, options);
    let outcome = if session.succeeded() {
        Ok(session.matched().map(Path::to_path_buf))
    } else {
        Err(anyhow!(session.error()))
    };
    downloader.cleanup(session);
    outcome
}

fn run_pipeline(downloader: &SubtitleDownloader, session: Session, options: &GetOptions) -> Session {
    if !session.succeeded() && options.engine.is_none() {
        return session;
    }

    let session = downloader.look_for_subtitles(session, &options.languages, options.engine.as_deref());
    if !session.succeeded() {
        return session;
    }
    if !session.error().is_empty() {
        eprintln!("warning: {}", session.error());
    }

    if options.list || (options.pick.is_none() && downloader.need_to_show_list(&session)) {
        print_candidates(downloader, &session);
    }
    if options.list {
        return session;
    }

    let Some(index) = options.pick.or_else(|| downloader.best_idx(&session)) else {
        return session;
    };

    let session = downloader.download(session, index);
    if !session.succeeded() {
        return session;
    }
    let session = if session.stage() == Stage::Unpacking {
        downloader.unpack(session, index)
    } else {
        session
    };
    if !session.succeeded() {
        return session;
    }
    let session = downloader.match_subtitles(session);
    if !session.succeeded() {
        return session;
    }

    downloader.post_process_subtitles(session)
}

fn print_candidates(downloader: &SubtitleDownloader, session: &Session) {
    let best = downloader.best_idx(session);
    for (i, candidate) in session.candidates().iter().enumerate() {
        let mark = if Some(i) == best { "*" } else { " " };
        let size = candidate.size.map(|s| format!(" {} B", s)).unwrap_or_default();
        println!(
            "{} [{}] {:<14} {:<3} {}{}",
            mark, i, candidate.engine, candidate.language, candidate.name, size
        );
    }
}

fn build_converter(settings: &Settings) -> Result<SubtitleConverter> {
    let fallback = encoding_for_label(&settings.general.fallback_encoding)?;
    Ok(
        SubtitleConverter::new(Arc::new(FormatRegistry::new()), Arc::new(FfprobeMovieInfo::new()))
            .with_fallback_encoding(fallback)
            .with_movie_extensions(settings.general.movie_extensions.clone()),
    )
}

fn build_engines(settings: &Settings) -> Result<EngineRegistry> {
    let http = ReqwestClient::new(Duration::from_secs(settings.general.network_timeout_secs))?;
    Ok(EngineRegistry::with_defaults(&settings.engines, Arc::new(http)))
}

fn build_downloader(settings: Arc<Settings>, config_path: &Path) -> Result<SubtitleDownloader> {
    let converter = build_converter(&settings)?;
    let engines = build_engines(&settings)?;
    let cache = FileChecksumCache::open(config_dir(config_path).join(CACHE_FILE_NAME));
    Ok(SubtitleDownloader::new(settings, Arc::new(engines), Arc::new(converter)).with_cache(Arc::new(cache)))
}

fn default_config_path() -> PathBuf {
    match ProjectDirs::from("", "", "subfetch") {
        Some(dirs) => dirs.config_dir().join(CONFIG_FILE_NAME),
        None => PathBuf::from(CONFIG_FILE_NAME),
    }
}

fn config_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_get_with_repeated_languages() {
        let cli = Cli::try_parse_from(["subfetch", "-vv", "get", "a.avi", "b.mkv", "-l", "pl", "-l", "en", "--pick", "2"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Get {
                movies,
                languages,
                pick,
                list,
                ..
            } => {
                assert_eq!(movies.len(), 2);
                assert_eq!(languages, vec!["pl", "en"]);
                assert_eq!(pick, Some(2));
                assert!(!list);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_negative_delay() {
        let cli = Cli::try_parse_from(["subfetch", "convert", "x.sub", "-f", "SRT", "--fps", "25", "--delay", "-1.5"]).unwrap();
        match cli.command {
            Command::Convert { delay, fps, .. } => {
                assert_eq!(delay, -1.5);
                assert_eq!(fps, Some(25.0));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
