use std::{
    env,
    fs::File,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use log::{error, info, warn};
use renderer_gltf::{
    archive::Archive,
    backend::HeadlessBackend,
    bounds::Aabb,
    loader::fetch::{ArchiveFetcher, FileFetcher},
    EntityId, LoadError, LoadResult, LoadedScene, Scene, SceneLoader,
};
use zip::ZipArchive;

/// Print the subtree under `top`, one indented line per entity.
fn print_tree(scene: &Scene, top: EntityId) {
    let mut stack = vec![(top, 0)];
    while let Some((id, depth)) = stack.pop() {
        let entity = scene.entity(id);
        let geometry = entity
            .geometry
            .as_ref()
            .and_then(|geometry| geometry.bounds)
            .unwrap_or(Aabb::EMPTY);
        println!(
            "{:indent$}{} {} {} {}",
            "",
            entity.name,
            entity.transform.world_bounds,
            entity.transform.local_bounds,
            geometry,
            indent = depth * 2
        );
        stack.extend(scene.children(id).iter().rev().map(|&child| (child, depth + 1)));
    }
}

async fn load_file(
    backend: Arc<HeadlessBackend>,
    path: &Path,
) -> LoadResult<LoadedScene<HeadlessBackend>> {
    let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let name = path.file_name().map(PathBuf::from).unwrap_or_default();
    SceneLoader::new(backend, FileFetcher::new(root))
        .load(name)
        .await
}

async fn load_bundle(
    backend: Arc<HeadlessBackend>,
    path: &Path,
) -> Result<LoadedScene<HeadlessBackend>, Box<dyn std::error::Error>> {
    let archive: ZipArchive<File> = Archive::open(File::open(path)?)?;
    let fetcher = ArchiveFetcher::<File, _>::new(archive);
    Ok(SceneLoader::new(backend, fetcher).load_bundle().await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let Some(path) = env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("Usage: renderer-inspect <file.gltf|file.glb|bundle.zip>");
        return ExitCode::FAILURE;
    };

    let backend = Arc::new(HeadlessBackend::new());
    let is_bundle = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("zip"));
    let loaded = if is_bundle {
        load_bundle(backend.clone(), &path).await
    } else {
        load_file(backend.clone(), &path)
            .await
            .map_err(|error: LoadError| error.into())
    };
    let loaded = match loaded {
        Ok(loaded) => loaded,
        Err(error) => {
            error!("Failed to load {}: {}", path.display(), error);
            return ExitCode::FAILURE;
        }
    };

    let LoadedScene {
        scene,
        maps,
        normalization,
        unsupported,
    } = loaded;
    let report = match tokio::task::spawn_blocking(move || maps.settle()).await {
        Ok(report) => report,
        Err(error) => {
            error!("Texture upload crashed: {}", error);
            return ExitCode::FAILURE;
        }
    };
    for (texture, error) in &report.errors {
        warn!("Texture #{} unavailable: {}", texture, error);
    }
    info!(
        "{} entities, {} textures attached, {} uploaded, {} accessors skipped",
        scene.len(),
        report.attached,
        backend.textures().len(),
        unsupported.len()
    );
    if let Some(normalization) = normalization {
        info!(
            "Normalized by {} around {}",
            normalization.scale, normalization.translation
        );
    }

    print_tree(&scene, scene.root());
    ExitCode::SUCCESS
}
