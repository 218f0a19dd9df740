use std::fs;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use actionkit_core::config::ActionSpec;
use actionkit_core::contract::{MockCompiler, MockImageMinifier, PipelineError};
use actionkit_core::rename::RenameParts;
use actionkit_core::{Action, ActionError, ActionKind, Toolkit};
use serde_json::json;
use tempfile::TempDir;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

fn tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    for (rel, contents) in files {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

fn read(dir: &TempDir, rel: &str) -> String {
    fs::read_to_string(dir.path().join(rel)).unwrap_or_else(|e| panic!("reading {rel}: {e}"))
}

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[test]
fn missing_parameters_are_reported_per_action() {
    let cases: Vec<(ActionKind, ActionSpec, &str)> = vec![
        (
            ActionKind::Copy,
            ActionSpec::new().with_src("a"),
            "Required parameter of action.copy not specified (src, dest)",
        ),
        (
            ActionKind::Clean,
            ActionSpec::new(),
            "Required parameter of action.clean not specified (src)",
        ),
        (
            ActionKind::MinifyImages,
            ActionSpec::new(),
            "Required parameter of action.minifyimg not specified (src)",
        ),
        (
            ActionKind::DeleteMarkers,
            ActionSpec::new().with_src("a"),
            "Required parameter of action.del not specified (src, marker)",
        ),
        (
            ActionKind::Template,
            ActionSpec::new().with_dest("dist"),
            "Required parameter of action.template not specified (src, dest)",
        ),
        (
            ActionKind::Stylesheet,
            ActionSpec::new().with_src("a.scss"),
            "Required parameter of action.stylesheet not specified (src, dest)",
        ),
        (
            ActionKind::Transform,
            ActionSpec::new().with_src("a"),
            "Required parameter of action.transform not specified (src, cb)",
        ),
        (
            ActionKind::Json,
            ActionSpec::new().with_src("a.json"),
            "Required parameter of action.json not specified (src, cb)",
        ),
        (
            ActionKind::Zip,
            ActionSpec::new().with_src("a"),
            "Required parameter of action.zip not specified (src, fname)",
        ),
        (
            ActionKind::Mkdirp,
            ActionSpec::new(),
            "Required parameter of action.mkdirp not specified (path)",
        ),
    ];
    for (kind, spec, expected) in cases {
        let err = Action::build(kind, spec).expect_err("construction must fail");
        assert!(matches!(err, ActionError::MissingParameter { .. }));
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn empty_src_list_counts_as_missing() {
    let err = Action::clean(ActionSpec::new().with_src(Vec::<&str>::new())).unwrap_err();
    assert!(matches!(err, ActionError::MissingParameter { action: "clean", .. }));
}

#[test]
fn default_action_names() {
    let copy = Action::copy(ActionSpec::new().with_src("a").with_dest("b")).unwrap();
    assert_eq!(copy.name(), "Copy");
    let del = Action::delete_markers(ActionSpec::new().with_src("a").with_marker("FOO")).unwrap();
    assert_eq!(del.name(), "Delete markers {FOO}");
    let mk = Action::mkdirp(ActionSpec::new().with_path("x")).unwrap();
    assert_eq!(mk.name(), "Create Directory");
    let img = Action::minify_images(ActionSpec::new().with_src("*.png")).unwrap();
    assert_eq!(img.name(), "Minify Images");

    let named = Action::clean(ActionSpec::new().with_src("dist").with_name("wipe")).unwrap();
    assert_eq!(named.name(), "wipe");
    assert_eq!(named.kind(), ActionKind::Clean);
}

#[test]
fn invalid_marker_name_is_rejected_at_construction() {
    let err = Action::delete_markers(ActionSpec::new().with_src("a").with_marker("debug"))
        .unwrap_err();
    assert!(matches!(err, ActionError::InvalidMarker(ref m) if m == "debug"));
}

#[test]
fn zip_name_must_be_a_plain_file_name() {
    let parts = RenameParts {
        suffix: Some("-x".into()),
        ..RenameParts::default()
    };
    let err = Action::zip(ActionSpec::new().with_src("a").with_rename(parts)).unwrap_err();
    assert!(matches!(err, ActionError::InvalidParameter { action: "zip", .. }));
}

#[tokio::test]
async fn copy_writes_to_every_destination_and_runs_callback_once() {
    let dir = tree(&[("src/a.txt", "A"), ("src/sub/b.txt", "B")]);
    let toolkit = Toolkit::new(dir.path());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let action = Action::copy(
        ActionSpec::new()
            .with_src("src/**/*.txt")
            .with_dest(vec!["out1", "out2"])
            .with_callback(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    )
    .unwrap();
    let outcome = action.execute(&toolkit).await.expect("copy runs");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.files, 2);
    assert_eq!(outcome.paths.len(), 4);
    assert_eq!(read(&dir, "out1/a.txt"), "A");
    assert_eq!(read(&dir, "out2/sub/b.txt"), "B");
}

#[tokio::test]
async fn copy_tolerates_missing_literal_source_by_default() {
    let dir = tree(&[]);
    let toolkit = Toolkit::new(dir.path());
    let outcome = Action::copy(ActionSpec::new().with_src("robots.txt").with_dest("dist"))
        .unwrap()
        .execute(&toolkit)
        .await
        .unwrap();
    assert_eq!(outcome.files, 0);

    let strict = Action::copy(
        ActionSpec::new()
            .with_src("robots.txt")
            .with_dest("dist")
            .with_opts(json!({"allow_empty": false})),
    )
    .unwrap();
    let err = strict.execute(&toolkit).await.unwrap_err();
    assert!(matches!(
        err,
        ActionError::Pipeline(PipelineError::NotFound(_))
    ));
}

#[tokio::test]
async fn copy_applies_rename_parts() {
    let dir = tree(&[("src/app.js", "x")]);
    let toolkit = Toolkit::new(dir.path());
    let parts = RenameParts {
        suffix: Some(".min".into()),
        ..RenameParts::default()
    };
    Action::copy(
        ActionSpec::new()
            .with_src("src/*.js")
            .with_dest("dist")
            .with_rename(parts),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap();
    assert_eq!(read(&dir, "dist/app.min.js"), "x");
}

#[tokio::test]
async fn clean_removes_matches() {
    let dir = tree(&[("dist/a.js", "a"), ("dist/b/c.js", "c")]);
    let toolkit = Toolkit::new(dir.path());
    let outcome = Action::clean(ActionSpec::new().with_src("dist"))
        .unwrap()
        .execute(&toolkit)
        .await
        .unwrap();
    assert_eq!(outcome.kind, Some(ActionKind::Clean));
    assert!(!dir.path().join("dist").exists());
}

#[tokio::test]
async fn delete_markers_strips_blocks_and_logs_each_one() {
    let dir = tree(&[("src/app.js", "a //{DEL FOO} b //{DEL} c")]);
    let toolkit = Toolkit::new(dir.path());

    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(EventCollector {
        events: events.clone(),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    Action::delete_markers(
        ActionSpec::new()
            .with_src("src/*.js")
            .with_dest("out")
            .with_marker("FOO"),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap();

    assert_eq!(read(&dir, "out/app.js"), "a c");
    assert_eq!(read(&dir, "src/app.js"), "a //{DEL FOO} b //{DEL} c");
    let events = events.lock().unwrap();
    assert!(
        events.iter().any(|e| e.contains("DEL FOO at:")),
        "expected a DEL event, got: {:?}",
        *events
    );
    assert!(events.iter().any(|e| e.contains("Finished 'Delete markers {FOO}'")));
}

#[tokio::test]
async fn delete_markers_without_dest_overwrites_sources() {
    let dir = tree(&[("src/app.js", "keep //{DEL X}\ndrop\n//{DEL}\n")]);
    let toolkit = Toolkit::new(dir.path());
    Action::delete_markers(ActionSpec::new().with_src("src/app.js").with_marker("X"))
        .unwrap()
        .execute(&toolkit)
        .await
        .unwrap();
    assert_eq!(read(&dir, "src/app.js"), "keep\n");
}

#[tokio::test]
async fn template_hands_each_file_and_options_to_the_compiler() {
    let dir = tree(&[("views/index.pug", "p hi"), ("views/about.pug", "p about")]);
    let mut compiler = MockCompiler::new();
    compiler.expect_compile().times(2).returning(|mut file, options| {
        assert_eq!(options, &json!({"pretty": true}));
        file.contents = b"<p>compiled</p>".to_vec();
        file.set_extension("html");
        Ok(file)
    });
    let toolkit = Toolkit::new(dir.path()).with_template_compiler(Arc::new(compiler));

    let outcome = Action::template(
        ActionSpec::new()
            .with_src("views/*.pug")
            .with_dest("public")
            .with_template_options(json!({"pretty": true}))
            .with_debug(true),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap();

    assert_eq!(outcome.files, 2);
    assert_eq!(read(&dir, "public/index.html"), "<p>compiled</p>");
    assert_eq!(read(&dir, "public/about.html"), "<p>compiled</p>");
}

#[tokio::test]
async fn compiler_failure_surfaces_unchanged() {
    let dir = tree(&[("styles/main.scss", "a {")]);
    let mut compiler = MockCompiler::new();
    compiler.expect_compile().returning(|file, _| {
        Err(PipelineError::Tool {
            tool: "sass".into(),
            path: file.path,
            message: "expected \"}\"".into(),
        })
    });
    let toolkit = Toolkit::new(dir.path()).with_stylesheet_compiler(Arc::new(compiler));

    let err = Action::stylesheet(
        ActionSpec::new()
            .with_src("styles/*.scss")
            .with_dest("css"),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap_err();
    assert!(matches!(err, ActionError::Pipeline(PipelineError::Tool { .. })));
    assert!(!dir.path().join("css").exists());
}

#[tokio::test]
async fn minify_images_uses_the_cache_on_repeat_runs() {
    let dir = tree(&[("img/logo.png", "large-original-bytes")]);
    let cache = TempDir::new().unwrap();
    let mut minifier = MockImageMinifier::new();
    minifier.expect_minify().times(1).returning(|mut file| {
        file.contents = b"small".to_vec();
        Ok(file)
    });
    let toolkit = Toolkit::new(dir.path())
        .with_image_minifier(Arc::new(minifier))
        .with_cache_dir(cache.path());

    for _ in 0..2 {
        Action::minify_images(
            ActionSpec::new()
                .with_src("img/*.png")
                .with_dest("dist/img")
                .with_cache(true),
        )
        .unwrap()
        .execute(&toolkit)
        .await
        .unwrap();
        assert_eq!(read(&dir, "dist/img/logo.png"), "small");
    }
    assert_eq!(fs::read_dir(cache.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn transform_rewrites_contents_without_running_callback() {
    let dir = tree(&[("src/a.txt", "hello")]);
    let toolkit = Toolkit::new(dir.path());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    Action::transform(
        ActionSpec::new()
            .with_src("src/*.txt")
            .with_dest("out")
            .with_callback(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .with_content_fn(|content, file| {
                format!("{}:{}", file.relative().display(), content.to_uppercase())
            }),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap();

    assert_eq!(read(&dir, "out/a.txt"), "a.txt:HELLO");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transform_applies_replacement_rules_in_order() {
    let dir = tree(&[("src/env.js", "const url = 'http://localhost:8080';")]);
    let toolkit = Toolkit::new(dir.path());
    Action::transform(
        ActionSpec::new()
            .with_src("src/env.js")
            .with_replacement("localhost:\\d+", "example.com")
            .with_replacement("http:", "https:"),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap();
    assert_eq!(
        read(&dir, "src/env.js"),
        "const url = 'https://example.com';"
    );
}

#[test]
fn transform_rejects_bad_replacement_pattern() {
    let err = Action::transform(ActionSpec::new().with_src("a").with_replacement("(", "x"))
        .unwrap_err();
    assert!(matches!(err, ActionError::Pattern(_)));
}

#[tokio::test]
async fn json_merge_patch_writes_compact_output() {
    let dir = tree(&[("app/manifest.json", "{\n  \"name\": \"x\",\n  \"nested\": {\"a\": 1}\n}")]);
    let toolkit = Toolkit::new(dir.path());
    Action::json(
        ActionSpec::new()
            .with_src("app/manifest.json")
            .with_merge(json!({"nested": {"b": 2}})),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap();
    assert_eq!(
        read(&dir, "app/manifest.json"),
        r#"{"name":"x","nested":{"a":1,"b":2}}"#
    );
}

#[tokio::test]
async fn json_callback_edits_document() {
    let dir = tree(&[("package.json", r#"{"version":"1.0.0"}"#)]);
    let toolkit = Toolkit::new(dir.path());
    Action::json(
        ActionSpec::new()
            .with_src("package.json")
            .with_dest("dist")
            .with_json_fn(|mut doc| {
                doc["version"] = json!("2.0.0");
                doc
            }),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap();
    assert_eq!(read(&dir, "dist/package.json"), r#"{"version":"2.0.0"}"#);
}

#[tokio::test]
async fn json_rejects_invalid_documents() {
    let dir = tree(&[("bad.json", "{not json")]);
    let toolkit = Toolkit::new(dir.path());
    let err = Action::json(ActionSpec::new().with_src("bad.json").with_merge(json!({})))
        .unwrap()
        .execute(&toolkit)
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Pipeline(PipelineError::Json { .. })));
}

#[tokio::test]
async fn zip_packs_sources_into_one_archive() {
    let dir = tree(&[("build/index.html", "<html/>"), ("build/js/app.js", "app()")]);
    let toolkit = Toolkit::new(dir.path());
    let outcome = Action::zip(
        ActionSpec::new()
            .with_src("build/**/*")
            .with_rename("release.zip")
            .with_dest("dist"),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap();
    assert_eq!(outcome.files, 2);

    let file = fs::File::open(dir.path().join("dist/release.zip")).unwrap();
    let mut archive = zip::ZipArchive::new(file).expect("valid zip");
    assert_eq!(archive.len(), 2);
    let mut contents = String::new();
    archive
        .by_name("js/app.js")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "app()");
}

#[tokio::test]
async fn zip_defaults_to_the_working_directory() {
    let dir = tree(&[("build/a.txt", "a")]);
    let toolkit = Toolkit::new(dir.path());
    Action::zip(
        ActionSpec::new()
            .with_src("build/*.txt")
            .with_rename("out.zip"),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap();
    assert!(dir.path().join("out.zip").is_file());
}

#[tokio::test]
async fn mkdirp_creates_nested_directories() {
    let dir = tree(&[]);
    let toolkit = Toolkit::new(dir.path());
    let outcome = Action::mkdirp(ActionSpec::new().with_path("build/assets/img"))
        .unwrap()
        .execute(&toolkit)
        .await
        .unwrap();
    assert_eq!(outcome.paths, vec![dir.path().join("build/assets/img")]);
    assert!(dir.path().join("build/assets/img").is_dir());
}

#[test]
fn specs_deserialise_from_task_file_shape() {
    let spec: ActionSpec = serde_json::from_value(json!({
        "src": ["src/**/*.js", "!src/vendor/**"],
        "dest": "dist",
        "fname": {"suffix": ".min"},
        "opts": {"dot": true}
    }))
    .unwrap();
    assert_eq!(spec.src.unwrap().globs().len(), 2);
    assert_eq!(spec.dest.unwrap().dirs().len(), 1);
    assert!(spec.fname.is_some());

    let kind: ActionKind = serde_json::from_value(json!("minifyimg")).unwrap();
    assert_eq!(kind, ActionKind::MinifyImages);
    let alias: ActionKind = serde_json::from_value(json!("pug")).unwrap();
    assert_eq!(alias, ActionKind::Template);
}

#[tokio::test]
async fn copy_with_unrelated_base_never_overwrites_sources() {
    let dir = tree(&[("src/a.txt", "A")]);
    let toolkit = Toolkit::new(dir.path());
    let err = Action::copy(
        ActionSpec::new()
            .with_src("src/*.txt")
            .with_dest("dist")
            .with_opts(json!({"base": "other"})),
    )
    .unwrap()
    .execute(&toolkit)
    .await
    .unwrap_err();
    assert!(matches!(err, ActionError::Pipeline(PipelineError::Other(_))), "got {err:?}");
    assert_eq!(read(&dir, "src/a.txt"), "A");
    assert!(!dir.path().join("dist").exists());
}

#[tokio::test]
async fn rename_cannot_escape_the_destination() {
    let dir = tree(&[("src/a.txt", "A")]);
    let toolkit = Toolkit::new(dir.path());
    let outside = dir.path().join("escaped.txt");
    for target in ["../escaped.txt", outside.to_str().unwrap()] {
        let err = Action::copy(
            ActionSpec::new()
                .with_src("src/a.txt")
                .with_dest("dist")
                .with_rename(target),
        )
        .unwrap()
        .execute(&toolkit)
        .await
        .unwrap_err();
        assert!(matches!(err, ActionError::Pipeline(PipelineError::Other(_))), "{target}: {err:?}");
    }
    assert!(!outside.exists());
    assert_eq!(read(&dir, "src/a.txt"), "A");
}

#[tokio::test]
async fn clean_refuses_paths_outside_the_root() {
    let dir = tree(&[("precious.txt", "keep"), ("project/dist/a.js", "a")]);
    let toolkit = Toolkit::new(dir.path().join("project"));
    let err = Action::clean(ActionSpec::new().with_src("../precious.txt"))
        .unwrap()
        .execute(&toolkit)
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Cannot delete files/directories outside the current working directory"));
    assert_eq!(read(&dir, "precious.txt"), "keep");
}
