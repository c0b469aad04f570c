use anyhow::{Context, Result, bail};
use std::path::Path;
use tracing::debug;

use super::{ManifestContext, ManifestRenderer, RdfRecord};
use crate::core::directory::DirectoryModel;
use crate::core::metadata::MetadataRecord;

/// Renders templates by substituting `{{NAME}}` placeholders.
///
/// Scalars (`ACCOUNT_ID`, `AIP_ROOT`, `TIMESTAMP`, `LISTING`) are inserted
/// XML-escaped. `FILES`, `AGENTS`, `EVENTS`, `OBJECTS` and `RDF` expand to
/// element lists. Placeholders with no data expand to nothing.
#[derive(Debug, Default)]
pub struct PlaceholderRenderer;

impl ManifestRenderer for PlaceholderRenderer {
    fn render(
        &self,
        template: &Path,
        output: &Path,
        charset: &str,
        context: &ManifestContext<'_>,
    ) -> Result<String> {
        if !is_utf8(charset) {
            bail!("Unsupported charset '{}'; only utf-8 is supported", charset);
        }

        let template_text = std::fs::read_to_string(template)
            .with_context(|| format!("Failed to read template {}", template.display()))?;

        let xml = fill(&template_text, context);

        std::fs::write(output, &xml)
            .with_context(|| format!("Failed to write manifest {}", output.display()))?;

        debug!(
            template = %template.display(),
            output = %output.display(),
            bytes = xml.len(),
            "Rendered manifest"
        );
        Ok(xml)
    }
}

fn is_utf8(charset: &str) -> bool {
    matches!(charset.to_ascii_lowercase().as_str(), "utf-8" | "utf8")
}

fn fill(template: &str, context: &ManifestContext<'_>) -> String {
    let state = context.state;
    let metadata = context.metadata;

    let replacements = [
        ("{{ACCOUNT_ID}}", escape(state.account_id.as_str())),
        ("{{AIP_ROOT}}", escape(&state.structure.root.display().to_string())),
        ("{{TIMESTAMP}}", escape(&(context.timestamp)())),
        ("{{LISTING}}", escape(context.listing.unwrap_or_default())),
        ("{{FILES}}", context.directory.map(files_xml).unwrap_or_default()),
        ("{{AGENTS}}", metadata.map(|m| records_xml(m.agents())).unwrap_or_default()),
        ("{{EVENTS}}", metadata.map(|m| records_xml(m.events())).unwrap_or_default()),
        ("{{OBJECTS}}", metadata.map(|m| records_xml(m.objects())).unwrap_or_default()),
        ("{{RDF}}", context.rdf.map(rdf_xml).unwrap_or_default()),
    ];

    let mut out = template.to_string();
    for (placeholder, value) in &replacements {
        if out.contains(placeholder) {
            out = out.replace(placeholder, value);
        }
    }
    out
}

fn files_xml(directory: &DirectoryModel) -> String {
    directory
        .sort()
        .iter()
        .map(|node| {
            let tag = if node.is_directory { "folder" } else { "file" };
            format!("<{} name=\"{}\"/>", tag, escape(&node.name))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn records_xml(records: &[MetadataRecord]) -> String {
    records
        .iter()
        .map(|record| {
            let mut xml = format!(
                "<{} alias=\"{}\" timestamp=\"{}\">",
                record.kind,
                escape(&record.alias),
                escape(&record.timestamp)
            );
            for (name, value) in &record.attributes {
                xml.push_str(&format!(
                    "<attribute name=\"{}\">{}</attribute>",
                    escape(name),
                    escape(value)
                ));
            }
            xml.push_str(&format!("</{}>", record.kind));
            xml
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn rdf_xml(records: &[RdfRecord]) -> String {
    records
        .iter()
        .map(|record| {
            let fields: String = record
                .fields
                .iter()
                .map(|(name, value)| {
                    format!("<field name=\"{}\">{}</field>", escape(name), escape(value))
                })
                .collect();
            format!("<record>{}</record>", fields)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
