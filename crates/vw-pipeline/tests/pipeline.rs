//! End-to-end tests for the render pipeline.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use vw_config::Config;
use vw_controllers::{BoxError, Controller, ControllerRef, ViewData};
use vw_directives::FIELD_CAPABILITY;
use vw_engine::TemplateEngine;
use vw_pipeline::{
    ErrorKind, Host, PipelineBuilder, PipelineConfig, PipelineError, RenderHooks,
};

#[derive(Default)]
struct RecordingHost {
    inactive: AtomicBool,
    broken: AtomicBool,
    emitted: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn emitted(&self) -> Vec<String> {
        self.emitted.lock().unwrap().clone()
    }
}

impl Host for RecordingHost {
    fn engine_active(&self) -> bool {
        !self.inactive.load(Ordering::SeqCst)
    }

    fn emit(&self, output: &str) -> io::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.emitted.lock().unwrap().push(output.to_owned());
        Ok(())
    }
}

struct StaticController {
    views: Vec<String>,
    data: serde_json::Value,
    calls: Arc<AtomicUsize>,
}

impl StaticController {
    fn new(views: &[&str], data: serde_json::Value) -> Self {
        Self {
            views: views.iter().map(|v| (*v).to_owned()).collect(),
            data,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Controller for StaticController {
    fn views(&self) -> &[String] {
        &self.views
    }

    fn process(&self) -> Result<ViewData, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.data {
            serde_json::Value::Object(map) => Ok(map.clone()),
            other => Err(format!("cannot bind {other}").into()),
        }
    }
}

fn set_mtime(path: &Path, mtime: SystemTime) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
}

/// Write a root template dated one minute in the past.
fn write_source(root: &Path, file: &str, content: &str) -> PathBuf {
    let path = root.join(file);
    fs::write(&path, content).unwrap();
    set_mtime(&path, SystemTime::now() - Duration::from_secs(60));
    path
}

/// Rewrite a root template dated slightly in the future.
fn edit_source(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    set_mtime(path, SystemTime::now() + Duration::from_secs(2));
}

fn theme() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("theme");
    fs::create_dir_all(&root).unwrap();
    (dir, root)
}

fn candidate(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_renders_bound_view_and_suppresses_include() {
    let (_dir, root) = theme();
    let source = write_source(&root, "home.html", "<h1>{{ title }}</h1>");
    let host = Arc::new(RecordingHost::default());

    let mut builder = PipelineBuilder::new(PipelineConfig::new(&root)).unwrap();
    builder
        .controllers_mut()
        .register(ControllerRef::instance(StaticController::new(
            &["home"],
            json!({"title": "Welcome"}),
        )))
        .unwrap();
    let pipeline = builder.build(Arc::clone(&host) as Arc<dyn Host>).unwrap();

    assert_eq!(pipeline.handle(candidate(&source)).unwrap(), "");
    assert_eq!(host.emitted(), vec!["<h1>Welcome</h1>"]);
}

#[test]
fn test_merges_controllers_in_registration_order() {
    let (_dir, root) = theme();
    let source = write_source(&root, "home.html", "{{ a }}-{{ b }}");
    let host = Arc::new(RecordingHost::default());

    let mut builder = PipelineBuilder::new(PipelineConfig::new(&root)).unwrap();
    builder
        .controllers_mut()
        .register([
            ControllerRef::instance(StaticController::new(&["home"], json!({"a": 1}))),
            ControllerRef::instance(StaticController::new(&["home"], json!({"a": 2, "b": 3}))),
        ])
        .unwrap();
    let pipeline = builder.build(Arc::clone(&host) as Arc<dyn Host>).unwrap();

    pipeline.handle(candidate(&source)).unwrap();
    assert_eq!(host.emitted(), vec!["2-3"]);
}

#[test]
fn test_unbound_view_renders_with_empty_data() {
    let (_dir, root) = theme();
    let source = write_source(&root, "single.html", "[{{ title }}]");
    let host = Arc::new(RecordingHost::default());

    let mut builder = PipelineBuilder::new(PipelineConfig::new(&root)).unwrap();
    builder
        .controllers_mut()
        .register(ControllerRef::instance(StaticController::new(
            &["home"],
            json!({"title": "Home"}),
        )))
        .unwrap();
    let pipeline = builder.build(Arc::clone(&host) as Arc<dyn Host>).unwrap();

    pipeline.handle(candidate(&source)).unwrap();
    assert_eq!(host.emitted(), vec!["[]"]);
}

#[test]
fn test_pass_through_does_no_work() {
    let (dir, root) = theme();
    let outside = dir.path().join("plugin");
    fs::create_dir_all(&outside).unwrap();
    let foreign = write_source(&outside, "home.html", "foreign");
    let source = write_source(&root, "home.html", "mine");

    let controller = StaticController::new(&["home"], json!({}));
    let calls = Arc::clone(&controller.calls);
    let host = Arc::new(RecordingHost::default());
    let mut builder = PipelineBuilder::new(PipelineConfig::new(&root)).unwrap();
    builder
        .controllers_mut()
        .register(ControllerRef::instance(controller))
        .unwrap();
    let pipeline = builder.build(Arc::clone(&host) as Arc<dyn Host>).unwrap();

    assert_eq!(pipeline.handle("").unwrap(), "");
    assert_eq!(
        pipeline.handle(candidate(&foreign)).unwrap(),
        candidate(&foreign)
    );

    host.inactive.store(true, Ordering::SeqCst);
    assert_eq!(
        pipeline.handle(candidate(&source)).unwrap(),
        candidate(&source)
    );

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(host.emitted().is_empty());
    assert!(pipeline.cache().artifact("home").unwrap().is_none());
}

#[test]
fn test_parent_dir_candidate_passes_through() {
    let (dir, root) = theme();
    let secret = dir.path().join("secret");
    fs::create_dir_all(&secret).unwrap();
    write_source(&secret, "passwd.html", "TOP SECRET");
    let host = Arc::new(RecordingHost::default());
    let pipeline = PipelineBuilder::new(PipelineConfig::new(&root))
        .unwrap()
        .build(Arc::clone(&host) as Arc<dyn Host>)
        .unwrap();

    let escaping = root.join("../secret/passwd.html");
    assert_eq!(
        pipeline.handle(candidate(&escaping)).unwrap(),
        candidate(&escaping)
    );
    assert!(host.emitted().is_empty());
    assert!(pipeline.cache().artifact("passwd").unwrap().is_none());
}

#[test]
fn test_emit_failure_fails_request() {
    let (_dir, root) = theme();
    let source = write_source(&root, "home.html", "<p>home</p>");
    let host = Arc::new(RecordingHost::default());
    host.broken.store(true, Ordering::SeqCst);
    let pipeline = PipelineBuilder::new(PipelineConfig::new(&root))
        .unwrap()
        .build(Arc::clone(&host) as Arc<dyn Host>)
        .unwrap();

    let err = pipeline.handle(candidate(&source)).unwrap_err();
    assert!(matches!(err, PipelineError::Emit(_)), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Render);
}

#[test]
fn test_refresh_after_edit() {
    let (_dir, root) = theme();
    let source = write_source(&root, "home.html", "v1");
    let host = Arc::new(RecordingHost::default());
    let pipeline = PipelineBuilder::new(PipelineConfig::new(&root))
        .unwrap()
        .build(Arc::clone(&host) as Arc<dyn Host>)
        .unwrap();

    pipeline.handle(candidate(&source)).unwrap();
    pipeline.handle(candidate(&source)).unwrap();
    edit_source(&source, "v2");
    pipeline.handle(candidate(&source)).unwrap();

    assert_eq!(host.emitted(), vec!["v1", "v1", "v2"]);
}

#[test]
fn test_artifact_at_least_as_new_as_source() {
    let (_dir, root) = theme();
    let source = write_source(&root, "page.html", "page");
    let pipeline = PipelineBuilder::new(PipelineConfig::new(&root))
        .unwrap()
        .build(Arc::new(RecordingHost::default()))
        .unwrap();

    for content in ["first", "second"] {
        edit_source(&source, content);
        let source_mtime = fs::metadata(&source).unwrap().modified().unwrap();
        pipeline.handle(candidate(&source)).unwrap();

        let artifact = pipeline.cache().artifact("page").unwrap().unwrap();
        assert!(artifact.mtime >= source_mtime);
        assert_eq!(artifact.content, content.as_bytes());
        assert_eq!(artifact.render_name, "cache/page");
    }
}

#[test]
fn test_controller_failure_aborts_request() {
    let (_dir, root) = theme();
    let source = write_source(&root, "home.html", "{{ title }}");
    let host = Arc::new(RecordingHost::default());

    let mut builder = PipelineBuilder::new(PipelineConfig::new(&root)).unwrap();
    builder
        .controllers_mut()
        .register(ControllerRef::instance(StaticController::new(
            &["home"],
            json!("not a mapping"),
        )))
        .unwrap();
    let pipeline = builder.build(Arc::clone(&host) as Arc<dyn Host>).unwrap();

    let err = pipeline.handle(candidate(&source)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert!(host.emitted().is_empty());
}

#[test]
fn test_missing_source_is_filesystem_error() {
    let (_dir, root) = theme();
    let host = Arc::new(RecordingHost::default());
    let pipeline = PipelineBuilder::new(PipelineConfig::new(&root))
        .unwrap()
        .build(Arc::clone(&host) as Arc<dyn Host>)
        .unwrap();

    let missing = root.join("missing.html");
    let err = pipeline.handle(candidate(&missing)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Filesystem);
    assert!(host.emitted().is_empty());
}

#[test]
fn test_capability_gating_across_compiles() {
    let (_dir, root) = theme();
    let source = write_source(&root, "single.html", "[@acffield('subtitle')]");
    let host = Arc::new(RecordingHost::default());

    let builder = PipelineBuilder::new(PipelineConfig::new(&root)).unwrap();
    let capabilities = builder.capabilities();
    let engine = builder.jinja_engine();
    engine.configure(|env| {
        env.add_function("get_field", |name: String| name.to_uppercase());
    });
    let pipeline = builder
        .engine(Arc::new(engine))
        .build(Arc::clone(&host) as Arc<dyn Host>)
        .unwrap();

    pipeline.handle(candidate(&source)).unwrap();

    capabilities.enable(FIELD_CAPABILITY);
    edit_source(&source, "[@acffield('subtitle')]");
    pipeline.handle(candidate(&source)).unwrap();

    assert_eq!(host.emitted(), vec!["[SUBTITLE]", "[]"]);
}

#[test]
fn test_capabilities_apply_to_output_from_earlier_pipeline() {
    let (_dir, root) = theme();
    let source = write_source(&root, "single.html", "[@acffield('t')]");

    let run = |capabilities: Vec<String>| {
        let host = Arc::new(RecordingHost::default());
        let mut config = PipelineConfig::new(&root);
        config.capabilities = capabilities;
        let builder = PipelineBuilder::new(config).unwrap();
        let engine = builder.jinja_engine();
        engine.configure(|env| {
            env.add_function("get_field", |name: String| name.to_uppercase());
        });
        let pipeline = builder
            .engine(Arc::new(engine))
            .build(Arc::clone(&host) as Arc<dyn Host>)
            .unwrap();
        pipeline.handle(candidate(&source)).unwrap();
        host.emitted()
    };

    assert_eq!(run(Vec::new()), vec!["[T]"]);
    // Source untouched: the second pipeline finds a fresh mirror and
    // compiled output written by the first.
    assert_eq!(run(vec![FIELD_CAPABILITY.to_owned()]), vec!["[]"]);
}

#[test]
fn test_edited_partial_shows_up() {
    let (_dir, root) = theme();
    let views = root.join("views");
    fs::create_dir_all(&views).unwrap();
    let header = views.join("header.jinja");
    fs::write(&header, "H1").unwrap();
    let source = write_source(&root, "home.html", "{% include 'header' %}|body");
    let host = Arc::new(RecordingHost::default());
    let pipeline = PipelineBuilder::new(PipelineConfig::new(&root))
        .unwrap()
        .build(Arc::clone(&host) as Arc<dyn Host>)
        .unwrap();

    pipeline.handle(candidate(&source)).unwrap();
    edit_source(&header, "H2");
    pipeline.handle(candidate(&source)).unwrap();

    assert_eq!(host.emitted(), vec!["H1|body", "H2|body"]);
}

struct Wrapping {
    forced: AtomicUsize,
}

impl RenderHooks for Wrapping {
    fn arguments(&self, mut data: ViewData, name: &str) -> ViewData {
        data.insert("view".to_owned(), name.replace('/', ".").into());
        data
    }

    fn html(&self, html: String, _name: &str, _data: &ViewData) -> String {
        format!("<main>{html}</main>")
    }

    fn force_recompile(&self, _source: &Path) -> bool {
        self.forced.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[test]
fn test_render_hooks() {
    let (_dir, root) = theme();
    let source = write_source(&root, "home.html", "{{ view }}");
    let host = Arc::new(RecordingHost::default());
    let pipeline = PipelineBuilder::new(PipelineConfig::new(&root))
        .unwrap()
        .hooks(Wrapping {
            forced: AtomicUsize::new(0),
        })
        .build(Arc::clone(&host) as Arc<dyn Host>)
        .unwrap();

    pipeline.handle(candidate(&source)).unwrap();
    let first = pipeline.cache().artifact("home").unwrap().unwrap().mtime;
    pipeline.handle(candidate(&source)).unwrap();

    assert_eq!(
        host.emitted(),
        vec!["<main>cache.home</main>", "<main>cache.home</main>"]
    );
    assert!(pipeline.cache().artifact("home").unwrap().unwrap().mtime >= first);
}

#[test]
fn test_view_renders_directly() {
    let (_dir, root) = theme();
    let partials = root.join("views/partials");
    fs::create_dir_all(&partials).unwrap();
    fs::write(partials.join("card.jinja"), "<div>{{ label }}</div>").unwrap();

    let pipeline = PipelineBuilder::new(PipelineConfig::new(&root))
        .unwrap()
        .build(Arc::new(RecordingHost::default()))
        .unwrap();

    let mut data = ViewData::new();
    data.insert("label".to_owned(), "Hi".into());
    assert_eq!(
        pipeline.view("partials/card", data).unwrap(),
        "<div>Hi</div>"
    );
    assert!(pipeline.exists("partials/card"));
    assert!(!pipeline.exists("partials/missing"));
}

#[test]
fn test_concurrent_requests_render_same_content() {
    let (_dir, root) = theme();
    let source = write_source(&root, "home.html", "<p>stable</p>");
    let host = Arc::new(RecordingHost::default());
    let pipeline = Arc::new(
        PipelineBuilder::new(PipelineConfig::new(&root))
            .unwrap()
            .build(Arc::clone(&host) as Arc<dyn Host>)
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let candidate = candidate(&source).to_owned();
            thread::spawn(move || pipeline.handle(&candidate).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "");
    }

    let emitted = host.emitted();
    assert_eq!(emitted.len(), 8);
    assert!(emitted.iter().all(|html| html == "<p>stable</p>"));
}

#[test]
fn test_from_config_binds_data_files() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("theme");
    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(root.join("data/home.yaml"), "title: From YAML\n").unwrap();
    let source = write_source(&root, "home.html", "<h1>{{ title }}</h1>");

    let config_path = dir.path().join("vw.toml");
    fs::write(
        &config_path,
        r#"
[templates]
root = "theme"

[[controllers]]
views = ["home"]
data = "data/home.yaml"
"#,
    )
    .unwrap();
    let config = Config::load(Some(&config_path), None).unwrap();

    let host = Arc::new(RecordingHost::default());
    let pipeline = PipelineBuilder::from_config(&config)
        .unwrap()
        .build(Arc::clone(&host) as Arc<dyn Host>)
        .unwrap();

    assert_eq!(pipeline.controllers().len(), 1);
    pipeline.handle(candidate(&source)).unwrap();
    assert_eq!(host.emitted(), vec!["<h1>From YAML</h1>"]);
}

#[test]
fn test_custom_engine() {
    struct Echo;

    impl TemplateEngine for Echo {
        fn render(
            &self,
            name: &str,
            data: &vw_engine::Context,
        ) -> Result<String, vw_engine::RenderError> {
            Ok(format!("{name}:{}", data.len()))
        }

        fn exists(&self, _name: &str) -> bool {
            true
        }

        fn invalidate(&self) {}
    }

    let (_dir, root) = theme();
    let source = write_source(&root, "home.html", "ignored");
    let host = Arc::new(RecordingHost::default());
    let pipeline = PipelineBuilder::new(PipelineConfig::new(&root))
        .unwrap()
        .engine(Arc::new(Echo))
        .build(Arc::clone(&host) as Arc<dyn Host>)
        .unwrap();

    pipeline.handle(candidate(&source)).unwrap();
    assert_eq!(host.emitted(), vec!["cache/home:0"]);
}
