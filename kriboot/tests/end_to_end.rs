use std::{
    fs::{self, File},
    io::{Cursor, Write},
    sync::Arc,
};

use kriboot::{
    eof::{self, EofBuilder, VolumeSpec},
    fs::FileSystem,
    Error, HostRuntime, Runtime, RuntimeOptions,
};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

const INDEX_JS: &str = "console.log(require('greeter').greet('kri'));\n";

fn archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    let data = writer.finish().unwrap().into_inner();
    assert!(data.len() >= eof::MIN_VOLUME_SIZE);
    data
}

/// Writes a fake host binary followed by a container and returns its path.
fn packaged(dir: &tempfile::TempDir, volumes: Vec<VolumeSpec>) -> std::path::PathBuf {
    let mut builder = EofBuilder::new();
    builder.add_init(b"require('/app/index.js');".to_vec());
    for volume in volumes {
        builder.add_volume(volume).unwrap();
    }
    builder.build(true).unwrap();

    let path = dir.path().join("packaged");
    let mut file = File::create(&path).unwrap();
    file.write_all(b"\x7fELF dummy host binary").unwrap();
    file.write_all(&[0xcc; 4096]).unwrap();
    builder.write_to(&mut file).unwrap();
    path
}

#[test]
fn single_startup_volume_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let data = archive(&[("index.js", INDEX_JS)]);
    let exe = packaged(
        &dir,
        vec![VolumeSpec::new("zip", "/app", data.clone())
            .index("index.js")
            .startup(true)],
    );

    let loaded = eof::load(&exe).unwrap();
    assert_eq!(loaded.volumes.len(), 1);
    assert_eq!(loaded.volumes[0].name, "/app");
    assert_eq!(loaded.volumes[0].kind, "zip");
    assert_eq!(loaded.volumes[0].data, data);
    assert_eq!(loaded.init, b"require('/app/index.js');");
    assert_eq!(loaded.main_path().as_deref(), Some("/app/index.js"));

    let runtime = Runtime::mount(loaded, RuntimeOptions::default()).unwrap();
    assert_eq!(runtime.fs().read_to_string(runtime.main_path()).unwrap(), INDEX_JS);
}

#[test]
fn patched_host_reads_through_volumes() {
    let dir = tempfile::tempdir().unwrap();
    let exe = packaged(
        &dir,
        vec![
            VolumeSpec::new("zip", "greeter", archive(&[(
                "index.js",
                "exports.greet = (name) => `hello ${name}`;\n",
            )]))
            .mapping("greeter"),
            VolumeSpec::new("zip", "app", archive(&[("index.js", INDEX_JS)]))
                .index("index.js")
                .startup(true),
        ],
    );

    let mut runtime = kriboot::boot(&exe, RuntimeOptions::default()).unwrap();
    assert_eq!(runtime.volumes()[0].name, "/app");
    assert_eq!(runtime.volumes()[1].name, "/greeter");

    let mut host = HostRuntime::native();
    let before = host.clone();
    assert_eq!(host.read_module("/app/index.js"), None);

    runtime.patch(&mut host).unwrap();
    assert_eq!(host.read_module("/app/index.js").as_deref(), Some(INDEX_JS));
    assert_eq!(host.stat("/app"), 1);
    assert_eq!(
        host.resolve("greeter", Some("/app/index.js")).unwrap(),
        "/greeter/index.js"
    );
    assert_eq!(host.fs.read_to_string("/app/index.js").unwrap(), INDEX_JS);
    assert!(matches!(runtime.patch(&mut host), Err(Error::IllegalState(_))));

    runtime.unpatch(&mut host);
    assert!(Arc::ptr_eq(&host.read_module_json, &before.read_module_json));
    assert!(Arc::ptr_eq(&host.module_stat, &before.module_stat));
    assert!(Arc::ptr_eq(&host.resolve_filename, &before.resolve_filename));
    assert!(Arc::ptr_eq(&host.fs, &before.fs));
    assert_eq!(host.read_module("/app/index.js"), None);
    runtime.unpatch(&mut host);
}

#[test]
fn native_volumes_redirect_to_host_directories() {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("assets");
    fs::create_dir(&assets).unwrap();
    fs::write(assets.join("logo.svg"), "<svg/>").unwrap();
    let mut location = assets.to_string_lossy().into_owned().into_bytes();
    location.resize(location.len().max(eof::MIN_VOLUME_SIZE), 0);

    let exe = packaged(
        &dir,
        vec![
            VolumeSpec::new("zip", "/app", archive(&[("index.js", INDEX_JS)])).startup(true),
            VolumeSpec::new("fs", "/assets", location),
        ],
    );
    let runtime = kriboot::boot(&exe, RuntimeOptions::default()).unwrap();
    assert_eq!(runtime.fs().read_to_string("/assets/logo.svg").unwrap(), "<svg/>");
    assert_eq!(runtime.fs().read_dir("/assets").unwrap(), ["logo.svg"]);
}

#[test]
fn corrupted_containers_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let exe = packaged(
        &dir,
        vec![VolumeSpec::new("zip", "/app", archive(&[("index.js", INDEX_JS)])).startup(true)],
    );
    let mut bytes = fs::read(&exe).unwrap();
    let last = bytes.len() - 1;
    bytes[last - eof::EOF_HEADER_SIZE + 1] ^= 0xff;
    let broken = dir.path().join("broken");
    fs::write(&broken, &bytes).unwrap();
    assert!(matches!(eof::load(&broken), Err(Error::InvalidSignature)));

    assert!(matches!(
        kriboot::boot(dir.path().join("missing"), RuntimeOptions::default()),
        Err(Error::Io(_))
    ));
}
