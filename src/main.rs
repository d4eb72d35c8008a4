use std::{
    fs::File,
    io::{copy, BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand};
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use jwalk::WalkDir;
use kriboot::{
    eof::{self, EofBuilder, VolumeSpec, DEFAULT_INDEX},
    fs::{BackendKind, FileSystem},
    HostRuntime, RuntimeOptions,
};

mod args;
use args::*;

mod manifest;
use manifest::Manifest;

mod permissions;
use permissions::copy_executable_permissions;

mod volume;
use volume::{native_volume, zip_dir, zip_script, PackageInfo};

pub const DEFAULT_INIT: &str = include_str!("init.js");

#[derive(Parser)]
#[command(about, version)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bundle a runtime executable and application volumes into one executable
    Pack(PackArgs),
    /// Show the container appended to a packaged executable
    Inspect {
        /// Path to the packaged executable
        exe: PathBuf,
    },
    /// Print a file from the volumes of a packaged executable
    Cat {
        /// Path to the packaged executable
        exe:  PathBuf,
        /// Virtual path of the file, e.g. /app/index.js
        path: String,
    },
}

#[derive(clap::Args)]
pub struct PackArgs {
    /// Deflate compression level (0-9), 0 stores files uncompressed
    #[arg(short = 'c', long, default_value = "6")]
    compression: u32,
    /// Mount name of the startup volume [default: package name or input name]
    #[arg(short = 'n', long)]
    name:        Option<String>,
    /// Entry file of the startup volume [default: package bin or main, or index.js]
    #[arg(short = 'i', long)]
    index:       Option<String>,
    /// Module name resolving to the startup volume
    #[arg(short = 'm', long)]
    mapping:     Option<String>,
    /// Init script executed before the entry file [default: built-in]
    #[arg(long)]
    init:        Option<PathBuf>,
    /// Additional volume as name=path[,type[,mapping]], type is zip or fs
    #[arg(short = 'v', long = "volume")]
    volumes:     Vec<String>,
    /// Path to a kri.json manifest [default: kri.json in the input directory]
    #[arg(long)]
    manifest:    Option<PathBuf>,
    /// Directory to save the init script and volume archives to
    #[arg(short = 'b', long)]
    build_dir:   Option<PathBuf>,
    /// Path to the runtime executable, e.g. node
    runtime:     PathBuf,
    /// Path to the application directory, script or zip archive
    input:       PathBuf,
    /// Path to or filename of the output executable [default: input name]
    output:      Option<PathBuf>,
}

fn relative(path: &Path) -> String {
    std::env::current_dir()
        .and_then(std::fs::canonicalize)
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(|path| path.display().to_string()))
        .unwrap_or_else(|| path.display().to_string())
}

/// Mount name used for a volume archive saved to the build directory.
fn archive_name(name: &str) -> String {
    format!("{}.zip", name.trim_matches('/').replace('/', "_"))
}

fn startup_volume(args: &PackArgs, source: &Path) -> VolumeArg {
    let is_archive = source.extension().is_some_and(|extension| extension == "zip");
    let package = if source.is_dir() {
        PackageInfo::read(source)
    } else {
        PackageInfo::default()
    };
    let name = args
        .name
        .clone()
        .or_else(|| package.name.clone())
        .or_else(|| {
            (source.is_dir() || is_archive)
                .then(|| source.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
                .flatten()
        })
        .unwrap_or_else(|| "app".to_owned());
    let index = args
        .index
        .clone()
        .or_else(|| package.entry(true).map(str::to_owned))
        .unwrap_or_else(|| DEFAULT_INDEX.to_owned());
    VolumeArg {
        name,
        input: source.to_owned(),
        kind: BackendKind::Zip,
        mapping: args.mapping.clone().unwrap_or_default(),
        index: Some(index),
        startup: true,
    }
}

fn pack(args: PackArgs) {
    let runtime = get_runtime(&args.runtime);
    let source = get_source(&args.input);
    let output = get_output(args.output.as_deref(), &source);
    let compression = get_compression(args.compression);
    let init = get_init(args.init.as_deref());
    let build_dir = get_build_dir(args.build_dir.as_deref());
    let base = if source.is_dir() {
        source.clone()
    } else {
        source.parent().map(Path::to_owned).unwrap_or_else(|| source.clone())
    };

    println!(
        "{} {}collecting volumes of {}…",
        style("[1/4]").bold().black(),
        Emoji("🔍 ", ""),
        style(relative(&source)).blue()
    );
    let manifest = match &args.manifest {
        Some(path) => Some(get_manifest(path)),
        None if base.join(Manifest::FILE_NAME).is_file() => Some(get_manifest(&base.join(Manifest::FILE_NAME))),
        None => None,
    };
    let mut volumes = vec![startup_volume(&args, &source)];
    if let Some(manifest) = manifest {
        let declared = manifest
            .volumes(&base)
            .unwrap_or_else(|e| fail("not a valid manifest volume", e));
        volumes.extend(declared.into_iter().map(|mut volume| {
            volume.input = get_source(&volume.input);
            volume
        }));
    }
    let cwd = std::env::current_dir().unwrap_or_else(|e| fail("couldn't get the current directory", e));
    volumes.extend(get_volumes(&args.volumes, &cwd));

    let count = volumes
        .iter()
        .filter(|volume| volume.kind == BackendKind::Zip && volume.input.is_dir())
        .map(|volume| WalkDir::new(&volume.input).skip_hidden(false).into_iter().count() as u64 - 1)
        .sum::<u64>();

    println!(
        "{} {}preparing {} volumes with {} files and directories…",
        style("[2/4]").bold().black(),
        Emoji("🚚 ", ""),
        style(volumes.len()).magenta(),
        style(count).magenta(),
    );
    let bar_progress = ProgressBar::new(count).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {elapsed_precise} [{wide_bar:.green}] {pos}/{len}\n{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar_progress.enable_steady_tick(Duration::from_millis(12));
    let mut prepared = Vec::with_capacity(volumes.len());
    let mut zipped_total = 0;
    for volume in volumes {
        let data = match volume.kind {
            BackendKind::Native => native_volume(&volume.input),
            BackendKind::Zip if volume.input.is_dir() => zip_dir(
                &volume.input,
                compression,
                || bar_progress.inc(1),
                |message| {
                    bar_progress.println(format!("      {}{}", Emoji("⚠ ", ""), style(message).red()));
                },
                |message| bar_progress.set_message(format!("{}", style(message).blue())),
            )
            .map(|(archive, zipped)| {
                zipped_total += zipped as u64;
                archive
            }),
            BackendKind::Zip if volume.input.extension().is_some_and(|extension| extension == "zip") => {
                std::fs::read(&volume.input)
            }
            BackendKind::Zip => zip_script(&volume.input, compression),
        }
        .unwrap_or_else(|e| {
            bar_progress.finish_and_clear();
            fail("couldn't prepare volume", format!("{}: {}", volume.input.display(), e))
        });
        let index = volume.index.clone().unwrap_or_else(|| {
            if volume.kind == BackendKind::Zip && volume.input.is_dir() {
                PackageInfo::read(&volume.input).entry(false).unwrap_or_default().to_owned()
            } else {
                String::new()
            }
        });
        prepared.push((volume, index, data));
    }
    bar_progress.finish_and_clear();
    let skipped = count.saturating_sub(zipped_total);
    println!(
        "      {}{} {} {}{}",
        Emoji("✨ ", ""),
        style("successfully prepared").green(),
        style(prepared.len()).magenta(),
        style("volumes").green(),
        if skipped > 0 {
            style(format!(" (skipped {} files)", skipped)).bold().red()
        } else {
            style(String::new())
        }
    );

    println!(
        "{} {}building container…",
        style("[3/4]").bold().black(),
        Emoji("📦 ", "")
    );
    let mut builder = EofBuilder::new();
    builder.add_init(init);
    if let Some(build_dir) = &build_dir {
        std::fs::write(build_dir.join("init.js"), builder.init())
            .unwrap_or_else(|e| fail("couldn't write to build directory", e));
    }
    for (volume, index, data) in prepared {
        if let (Some(build_dir), BackendKind::Zip) = (&build_dir, volume.kind) {
            std::fs::write(build_dir.join(archive_name(&volume.name)), &data)
                .unwrap_or_else(|e| fail("couldn't write to build directory", e));
        }
        let spec = VolumeSpec::new(volume.kind.tag(), &volume.name, data)
            .mapping(&volume.mapping)
            .index(&index)
            .startup(volume.startup);
        builder
            .add_volume(spec)
            .unwrap_or_else(|e| fail("couldn't add volume", format!("{}: {}", volume.name, e)));
        println!(
            "      {} {} {}",
            style(&volume.name).blue(),
            style(volume.kind).dim(),
            if volume.mapping.is_empty() {
                String::new()
            } else {
                format!("as {}", style(&volume.mapping).magenta())
            }
        );
    }
    builder
        .build(true)
        .unwrap_or_else(|e| fail("couldn't build container", e));

    println!(
        "{} {}writing {}…",
        style("[4/4]").bold().black(),
        Emoji("📃 ", ""),
        style(relative(&output)).blue()
    );
    let file = File::create(&output).unwrap_or_else(|_| fail("couldn't create output file", output.display()));
    let mut writer = BufWriter::new(file);
    let mut runtime_file =
        File::open(&runtime).unwrap_or_else(|e| fail("couldn't open runtime", format!("{}: {}", runtime.display(), e)));
    let runtime_size =
        copy(&mut runtime_file, &mut writer).unwrap_or_else(|e| fail("couldn't write runtime", e));
    let container_size = builder
        .write_to(&mut writer)
        .unwrap_or_else(|e| fail("couldn't write container", e));
    writer.flush().unwrap_or_else(|e| fail("couldn't write output file", e));
    drop(writer);
    copy_executable_permissions(&runtime, &output).unwrap_or_else(|e| {
        eprintln!("failed to set executable permissions for {}: {}", output.display(), e)
    });

    println!(
        "      {}{} {} {} {} {}",
        Emoji("✨ ", ""),
        style("runtime").green(),
        style(runtime_size).magenta(),
        style("bytes, container").green(),
        style(container_size).magenta(),
        style("bytes").green(),
    );
    println!("     {} {}", Emoji("✨ ", ""), style("done!").green());
}

fn inspect(exe: &Path) {
    let eof = eof::load(exe).unwrap_or_else(|e| fail("couldn't load container", format!("{}: {}", exe.display(), e)));
    println!("{}: {}", style("format version").blue().bright(), eof.version);
    println!("{}: {} bytes", style("init").blue().bright(), eof.init.len());
    if let Some(main) = eof.main_path() {
        println!("{}: {}", style("main").blue().bright(), main);
    }
    println!("{}:", style("volumes").blue().bright());
    for volume in &eof.volumes {
        println!(
            "  {} {} {} bytes{}{}{}",
            style(&volume.name).blue(),
            style(&volume.kind).dim(),
            style(volume.data.len()).magenta(),
            if volume.index.is_empty() { String::new() } else { format!(", index {}", volume.index) },
            if volume.mapping.is_empty() { String::new() } else { format!(", mapped as {}", volume.mapping) },
            if volume.startup { style(" (startup)").bold().dim().to_string() } else { String::new() },
        );
    }
}

fn cat(exe: &Path, path: &str) {
    let mut runtime = kriboot::boot(exe, RuntimeOptions::default())
        .unwrap_or_else(|e| fail("couldn't boot container", format!("{}: {}", exe.display(), e)));
    let mut host = HostRuntime::native();
    runtime
        .patch(&mut host)
        .unwrap_or_else(|e| fail("couldn't patch runtime", e));
    let data = host.fs.read_file(path);
    runtime.unpatch(&mut host);
    let data = data.unwrap_or_else(|e| fail("couldn't read file", e));
    std::io::stdout()
        .write_all(&data)
        .unwrap_or_else(|e| fail("couldn't write to stdout", e));
}

fn main() {
    color_backtrace::install();

    let args = Args::parse();
    match args.command {
        Command::Pack(args) => pack(args),
        Command::Inspect { exe } => inspect(&exe),
        Command::Cat { exe, path } => cat(&exe, &path),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verifies_arguments() { Args::command().debug_assert(); }

    #[test]
    fn parses_pack_arguments() {
        let args = Args::try_parse_from([
            "kri", "pack", "node", "app", "out", "-v", "/assets=public,fs", "--volume", "lodash=lodash,zip,lodash",
            "-c", "0", "--name", "demo",
        ])
        .unwrap();
        let Command::Pack(args) = args.command else { panic!("expected pack") };
        assert_eq!(args.volumes.len(), 2);
        assert_eq!(args.compression, 0);
        assert_eq!(args.name.as_deref(), Some("demo"));
        assert_eq!(args.output, Some(PathBuf::from("out")));
    }

    #[test]
    fn names_startup_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir(&project).unwrap();
        std::fs::write(project.join("package.json"), r#"{"name": "demo", "bin": "cli.js"}"#).unwrap();
        let args = Args::try_parse_from(["kri", "pack", "node", "project"]).unwrap();
        let Command::Pack(args) = args.command else { panic!("expected pack") };

        let volume = startup_volume(&args, &project);
        assert_eq!(volume.name, "demo");
        assert_eq!(volume.index.as_deref(), Some("cli.js"));
        assert!(volume.startup);

        let script = dir.path().join("main.js");
        std::fs::write(&script, "").unwrap();
        let volume = startup_volume(&args, &script);
        assert_eq!(volume.name, "app");
        assert_eq!(volume.index.as_deref(), Some("index.js"));

        assert_eq!(archive_name("/node_modules/lodash"), "node_modules_lodash.zip");
    }
}
