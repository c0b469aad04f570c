use roxmltree::{Document, ParsingOptions};
use tracing::debug;

use super::SchemaValidator;

/// Well-formedness check standing in for a full XSD validator.
///
/// The document must parse as XML 1.0: exactly one root element, tags
/// closed in order, quoted attributes, known entities and declared
/// namespace prefixes. A DOCTYPE is allowed.
#[derive(Debug, Default)]
pub struct WellFormedValidator;

impl SchemaValidator for WellFormedValidator {
    fn validate(&self, xml: &str) -> bool {
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };

        match Document::parse_with_options(xml, options) {
            Ok(document) => {
                debug!(
                    root = %document.root_element().tag_name().name(),
                    "Document is well-formed"
                );
                true
            }
            Err(e) => {
                debug!(error = %e, "Document is not well-formed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_well_formed_document() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- manifest -->
<mets:mets xmlns:mets="http://www.loc.gov/METS/">
  <mets:fileSec><file name="a &amp; b"/></mets:fileSec>
  <note><![CDATA[ <not a tag> ]]></note>
</mets:mets>"#;
        assert!(WellFormedValidator.validate(xml));
    }

    #[test]
    fn test_accepts_angle_bracket_in_quoted_attribute() {
        assert!(WellFormedValidator.validate(r#"<mets note="a > b"/>"#));
    }

    #[test]
    fn test_rejects_unclosed_element() {
        assert!(!WellFormedValidator.validate("<a><b></a>"));
        assert!(!WellFormedValidator.validate("<a>"));
    }

    #[test]
    fn test_rejects_multiple_roots_and_empty() {
        assert!(!WellFormedValidator.validate("<a/><b/>"));
        assert!(!WellFormedValidator.validate(""));
        assert!(!WellFormedValidator.validate("plain text"));
    }

    #[test]
    fn test_rejects_text_outside_root() {
        assert!(!WellFormedValidator.validate("not xml at all <mets/>"));
    }

    #[test]
    fn test_rejects_bare_ampersand() {
        assert!(!WellFormedValidator.validate("<mets>a & b</mets>"));
    }

    #[test]
    fn test_rejects_unquoted_attribute() {
        assert!(!WellFormedValidator.validate("<mets id=oops/>"));
    }

    #[test]
    fn test_rejects_stray_markup() {
        assert!(!WellFormedValidator.validate("<a>1 < 2</a>"));
    }

    #[test]
    fn test_rejects_undeclared_prefix() {
        assert!(!WellFormedValidator.validate("<mets:mets/>"));
    }
}
