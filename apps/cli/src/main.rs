use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use badge_core::{BadgeSession, DirEntry, NusbTransport, SessionConfig};
use clap::{Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "MCH2022 badge WebUSB tool", long_about = None)]
struct Args {
    /// USB device address of the badge, when several are attached
    #[arg(long, global = true)]
    address: Option<u8>,

    /// Session configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List a directory on the badge
    Ls {
        /// Remote directory
        #[arg(default_value = "/internal")]
        path: String,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
    /// List installed apps
    Apps,
    /// Upload a file or directory tree
    Push {
        /// Local file or directory
        local: PathBuf,
        /// Remote path, starting with /internal or /sd
        remote: String,
    },
    /// Download a file
    Pull {
        /// Remote file
        remote: String,
        /// Local destination
        local: PathBuf,
    },
    /// Create a directory
    Mkdir { path: String },
    /// Remove a file or empty directory
    Rm { path: String },
    /// Check whether a file exists
    Exists { path: String },
    /// Round-trip a payload through the badge
    Ping {
        #[arg(default_value = "Hello world")]
        text: String,
    },
    /// Reboot the badge into its normal firmware
    Reset,
    /// Write a configuration file with default values
    ConfigInit { path: PathBuf },
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };

    match args.command {
        Commands::ConfigInit { path } => {
            config.save_to_file(&path)?;
            info!(path = %path.display(), "Configuration written");
            Ok(())
        }
        Commands::Reset => {
            let mut session = open(&config, args.address)?;
            session.reset()?;
            println!("Badge reset");
            Ok(())
        }
        command => {
            let mut session = connect(&config, args.address)?;
            execute(&mut session, command)
        }
    }
}

fn open(config: &SessionConfig, address: Option<u8>) -> Result<BadgeSession<NusbTransport>> {
    let transport = NusbTransport::open_with(config.device_selector(address))?;
    Ok(BadgeSession::new(transport, config.clone()))
}

fn connect(config: &SessionConfig, address: Option<u8>) -> Result<BadgeSession<NusbTransport>> {
    let mut session = open(config, address)?;
    if !session.establish_connection()? {
        bail!("Failed to connect to the badge");
    }
    Ok(session)
}

fn execute(session: &mut BadgeSession<NusbTransport>, command: Commands) -> Result<()> {
    match command {
        Commands::Ls { path, recursive } => list(session, remote_dir(&path), recursive),
        Commands::Apps => {
            let Some(apps) = session.list_apps()? else {
                bail!("Failed to list apps");
            };
            println!("Number of apps: {}", apps.len());
            println!("{:<10}  {:<8}  name", "size", "version");
            println!("==============================");
            for app in apps {
                println!(
                    "{:<10}  {:<8}  \"{}\" ({})",
                    app.size,
                    app.version,
                    app.name_lossy(),
                    app.title_lossy()
                );
            }
            Ok(())
        }
        Commands::Push { local, remote } => {
            if !(remote.starts_with("/internal") || remote.starts_with("/sd")) {
                bail!("Path should always start with /internal or /sd");
            }
            let remote = remote.trim_end_matches('/');
            if local.is_dir() {
                push_tree(session, &local, remote)
            } else {
                push_file(session, &local, remote)
            }
        }
        Commands::Pull { remote, local } => {
            let Some(data) = session.file_read(&remote)? else {
                bail!("Failed to read {}", remote);
            };
            fs::write(&local, &data).with_context(|| format!("writing {}", local.display()))?;
            println!("{} -> {} ({} bytes)", remote, local.display(), data.len());
            Ok(())
        }
        Commands::Mkdir { path } => report(session.create_directory(&path)?, "Directory created"),
        Commands::Rm { path } => report(session.remove(&path)?, "Removed"),
        Commands::Exists { path } => {
            println!("{}", if session.file_exists(&path)? { "yes" } else { "no" });
            Ok(())
        }
        Commands::Ping { text } => report(session.ping(text.as_bytes())?, "Pong"),
        Commands::Reset | Commands::ConfigInit { .. } => Ok(()),
    }
}

fn report(ok: bool, message: &str) -> Result<()> {
    if !ok {
        bail!("Operation failed");
    }
    println!("{}", message);
    Ok(())
}

fn list(session: &mut BadgeSession<NusbTransport>, location: &str, recursive: bool) -> Result<()> {
    let Some(entries) = session.list_directory(location)? else {
        println!("{} ** Failed to open directory **", location);
        return Ok(());
    };

    for entry in entries {
        let path = join_remote(location, &entry.name_lossy());
        println!("{}", format_entry(&path, &entry));
        if recursive && entry.is_dir() {
            list(session, &path, recursive)?;
        }
    }
    Ok(())
}

/// Remote directory without trailing slashes; the root stays `/`.
fn remote_dir(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

fn format_entry(path: &str, entry: &DirEntry) -> String {
    let marker = if entry.is_dir() { "[DIR] " } else { "      " };
    let (size, modified) = match entry.stat {
        Some(stat) => {
            let size = if entry.is_dir() {
                String::new()
            } else if stat.size >= 1024 {
                format!("{:.2} KB", stat.size as f64 / 1024.0)
            } else {
                format!("{} B", stat.size)
            };
            let modified = i64::try_from(stat.modified)
                .ok()
                .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            (size, modified)
        }
        None => (String::new(), String::new()),
    };
    format!("{}{:<64}{:<16}{}", marker, path, size, modified)
}

fn push_file(session: &mut BadgeSession<NusbTransport>, local: &Path, remote: &str) -> Result<()> {
    let data = fs::read(local).with_context(|| format!("reading {}", local.display()))?;
    if !session.file_write_all(remote, &data)? {
        bail!("Failed to push file {} to {}", local.display(), remote);
    }
    println!("File {} pushed succesfully to {}", local.display(), remote);
    Ok(())
}

fn push_tree(session: &mut BadgeSession<NusbTransport>, local: &Path, remote: &str) -> Result<()> {
    let mut entries = fs::read_dir(local)
        .with_context(|| format!("reading {}", local.display()))?
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let target = format!("{}/{}", remote, name.to_string_lossy());
        if entry.file_type()?.is_dir() {
            if !session.create_directory(&target)? {
                info!(path = %target, "Directory not created, it may already exist");
            }
            push_tree(session, &entry.path(), &target)?;
        } else {
            push_file(session, &entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use badge_core::{EntryKind, EntryStat};

    #[test]
    fn test_remote_dir_keeps_root() {
        assert_eq!(remote_dir("/"), "/");
        assert_eq!(remote_dir("//"), "/");
        assert_eq!(remote_dir("/internal/"), "/internal");
        assert_eq!(remote_dir("/sd"), "/sd");
        assert_eq!(join_remote("/", "internal"), "/internal");
        assert_eq!(join_remote("/internal", "apps"), "/internal/apps");
    }

    #[test]
    fn test_format_entry() {
        let file = DirEntry {
            kind: EntryKind::File,
            name: b"a.txt".to_vec(),
            stat: Some(EntryStat {
                size: 2048,
                modified: 0,
            }),
        };
        let line = format_entry("/internal/a.txt", &file);
        assert!(line.starts_with("      /internal/a.txt"));
        assert!(line.contains("2.00 KB"));
        assert!(line.ends_with("1970-01-01 00:00:00"));

        let dir = DirEntry {
            kind: EntryKind::Directory,
            name: b"apps".to_vec(),
            stat: None,
        };
        assert_eq!(format_entry("/internal/apps", &dir).trim_end(), "[DIR] /internal/apps");
    }
}
