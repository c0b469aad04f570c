//! End-to-end packaging: assembly, snapshot, metadata and manifests.

use aip_packager::PackagerError;
use aip_packager::core::{
    AccountId, JsonRdfLoader, ManifestContext, ManifestRenderer, Packager, PackagerOptions,
    PlaceholderRenderer, WellFormedValidator,
};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use tempfile::{TempDir, tempdir};

fn create_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

struct Fixture {
    source: TempDir,
    destination: TempDir,
    templates: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            source: tempdir().unwrap(),
            destination: tempdir().unwrap(),
            templates: tempdir().unwrap(),
        };
        create_file(
            &fixture.source.path().join("mime/ACCT123/msg1.mbox"),
            b"From: someone",
        );
        create_file(
            &fixture.source.path().join("eaxs/ACCT123/acct.eaxs"),
            b"<Account/>",
        );
        fixture
    }

    fn options(&self) -> PackagerOptions {
        PackagerOptions::new(
            AccountId::new("ACCT123").unwrap(),
            self.source.path(),
            self.destination.path(),
        )
    }

    fn template(&self, name: &str, content: &str) -> std::path::PathBuf {
        let path = self.templates.path().join(name);
        create_file(&path, content.as_bytes());
        path
    }

    fn root(&self) -> std::path::PathBuf {
        self.destination.path().join("ACCT123")
    }
}

/// Counts calls, then delegates to the placeholder renderer.
struct CountingRenderer {
    calls: Rc<Cell<usize>>,
}

impl ManifestRenderer for CountingRenderer {
    fn render(
        &self,
        template: &Path,
        output: &Path,
        charset: &str,
        context: &ManifestContext<'_>,
    ) -> anyhow::Result<String> {
        self.calls.set(self.calls.get() + 1);
        PlaceholderRenderer.render(template, output, charset, context)
    }
}

struct FailingRenderer;

impl ManifestRenderer for FailingRenderer {
    fn render(
        &self,
        _template: &Path,
        _output: &Path,
        _charset: &str,
        _context: &ManifestContext<'_>,
    ) -> anyhow::Result<String> {
        anyhow::bail!("template engine exploded")
    }
}

fn counting_packager(options: PackagerOptions) -> (Packager, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let packager = Packager::with_collaborators(
        options,
        Box::new(CountingRenderer {
            calls: calls.clone(),
        }),
        Box::new(WellFormedValidator),
        Some(Box::new(JsonRdfLoader)),
    );
    (packager, calls)
}

#[test]
fn test_package_without_templates() {
    let fixture = Fixture::new();
    let (mut packager, calls) = counting_packager(fixture.options());

    let outcome = packager.package(true).unwrap();

    assert!(outcome.valid);
    assert!(outcome.manifest.is_none());
    assert_eq!(outcome.root, fixture.root());
    assert!(fixture.root().join("mime/msg1.mbox").is_file());
    assert!(fixture.root().join("eaxs/acct.eaxs").is_file());
    assert_eq!(outcome.transfers.attempted().len(), 2);

    assert_eq!(calls.get(), 0);
    assert!(packager.directory().is_none());
    assert!(packager.metadata().is_none());
    assert_eq!(
        packager.engine().map(|engine| engine.validate()),
        Some(outcome.valid)
    );
}

#[test]
fn test_package_without_templates_reports_invalid_structure() {
    let fixture = Fixture::new();
    std::fs::remove_dir_all(fixture.source.path().join("eaxs")).unwrap();
    let (mut packager, calls) = counting_packager(fixture.options());

    let outcome = packager.package(true).unwrap();

    assert!(!outcome.valid);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_package_writes_primary_manifest() {
    let fixture = Fixture::new();
    let mut options = fixture.options();
    options.manifest_template = Some(fixture.template(
        "mets.xml",
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<mets id=\"{{ACCOUNT_ID}}\" created=\"{{TIMESTAMP}}\">\n{{FILES}}\n</mets>\n",
    ));
    let (mut packager, calls) = counting_packager(options);

    let outcome = packager.package(true).unwrap();

    assert!(outcome.valid);
    assert_eq!(outcome.manifest.as_deref(), Some("ACCT123.mets.xml"));
    assert_eq!(calls.get(), 1);

    let xml = std::fs::read_to_string(fixture.root().join("ACCT123.mets.xml")).unwrap();
    assert!(xml.contains("id=\"ACCT123\""));
    assert!(xml.contains("<file name=\"mime/msg1.mbox\"/>"));
    assert!(xml.contains("<folder name=\"eaxs\"/>"));

    let directory = packager.directory().unwrap();
    assert!(directory.find("eaxs/acct.eaxs").is_some());
}

#[test]
fn test_malformed_primary_manifest_is_invalid() {
    let fixture = Fixture::new();
    let mut options = fixture.options();
    options.manifest_template = Some(fixture.template("mets.xml", "<mets><open></mets>"));

    let outcome = Packager::new(options).package(true).unwrap();

    assert!(!outcome.valid);
    assert!(fixture.root().join("ACCT123.mets.xml").is_file());
    assert!(fixture.root().join("mime/msg1.mbox").is_file());
}

#[test]
fn test_failing_renderer_downgrades_validity() {
    let fixture = Fixture::new();
    let mut options = fixture.options();
    options.manifest_template = Some(fixture.template("mets.xml", "<mets/>"));
    let mut packager = Packager::with_collaborators(
        options,
        Box::new(FailingRenderer),
        Box::new(WellFormedValidator),
        None,
    );

    let outcome = packager.package(true).unwrap();

    assert!(!outcome.valid);
    assert!(packager.engine().unwrap().validate());
    assert!(!fixture.root().join("ACCT123.mets.xml").exists());
}

#[test]
fn test_manifest_list_is_checked_for_existence_only() {
    let fixture = Fixture::new();
    let mut options = fixture.options();
    options.manifest_list_template = Some(fixture.template("list.txt", "{{LISTING}}"));

    let mut packager = Packager::new(options);
    let outcome = packager.package(true).unwrap();

    assert!(outcome.valid);
    assert!(outcome.manifest.is_none());

    let listing = std::fs::read_to_string(fixture.root().join("ACCT123.mets.manifest")).unwrap();
    assert_eq!(listing, "ACCT123\neaxs/\n  acct.eaxs\nmime/\n  msg1.mbox\n");
}

#[test]
fn test_unsupported_charset_fails_only_the_manifest() {
    let fixture = Fixture::new();
    let mut options = fixture.options();
    options.manifest_template = Some(fixture.template("mets.xml", "<mets/>"));
    options.charset = "latin-1".to_string();

    let outcome = Packager::new(options).package(true).unwrap();

    assert!(!outcome.valid);
    assert!(fixture.root().join("eaxs/acct.eaxs").is_file());
}

#[test]
fn test_events_log_and_rdf_feed_the_manifest() {
    let fixture = Fixture::new();
    let events = fixture.templates.path().join("events.yaml");
    create_file(
        &events,
        br#"
- "2018-05-17T12:40:52-0400":
    type: agent
    alias: pst2mime_converter
    name: PST Converter
- "2018-05-17T12:40:53-0400":
    type: event
    alias: pst2mime
    agent: pst2mime_converter
"#,
    );
    let rdf = fixture.templates.path().join("rdf.json");
    create_file(&rdf, br#"[{"title": "Mail & more"}]"#);

    let mut options = fixture.options();
    options.events_log = Some(events);
    options.rdf_source = Some(rdf);
    options.manifest_template = Some(fixture.template(
        "mets.xml",
        "<mets>\n<agents>{{AGENTS}}</agents>\n<events>{{EVENTS}}</events>\n<rdf>{{RDF}}</rdf>\n</mets>",
    ));

    let mut packager = Packager::new(options);
    let outcome = packager.package(true).unwrap();

    assert!(outcome.valid);
    let metadata = packager.metadata().unwrap();
    assert_eq!(metadata.agents().len(), 1);
    assert_eq!(metadata.events().len(), 1);

    let xml = std::fs::read_to_string(fixture.root().join("ACCT123.mets.xml")).unwrap();
    assert!(xml.contains("alias=\"pst2mime_converter\""));
    assert!(xml.contains("<field name=\"title\">Mail &amp; more</field>"));
}

#[test]
fn test_broken_events_log_fails_only_the_manifest() {
    let fixture = Fixture::new();
    let events = fixture.templates.path().join("events.yaml");
    create_file(&events, b"- \"not a date\":\n    type: agent\n    alias: a\n");

    let mut options = fixture.options();
    options.events_log = Some(events);
    options.manifest_template = Some(fixture.template("mets.xml", "<mets/>"));

    let mut packager = Packager::new(options);
    let outcome = packager.package(true).unwrap();

    assert!(!outcome.valid);
    assert!(packager.metadata().is_none());
    assert!(packager.engine().unwrap().validate());
}

#[test]
fn test_package_refuses_existing_root() {
    let fixture = Fixture::new();
    std::fs::create_dir(fixture.root()).unwrap();

    let err = Packager::new(fixture.options()).package(true).unwrap_err();

    assert!(matches!(err, PackagerError::AlreadyExists { .. }));
    assert!(
        fixture
            .source
            .path()
            .join("mime/ACCT123/msg1.mbox")
            .is_file()
    );
}

#[test]
fn test_package_without_moving_validates_in_place() {
    let fixture = Fixture::new();
    create_file(&fixture.root().join("mime/msg1.mbox"), b"mail");
    create_file(&fixture.root().join("eaxs/acct.eaxs"), b"eaxs");

    let outcome = Packager::new(fixture.options()).package(false).unwrap();

    assert!(outcome.valid);
    assert!(outcome.transfers.attempted().is_empty());
    assert!(
        fixture
            .source
            .path()
            .join("mime/ACCT123/msg1.mbox")
            .is_file()
    );
}
