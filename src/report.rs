//! Field extraction for credit report text.
//!
//! Each field is a forward scan that stops at the first match. The rules are
//! anchored on the literal labels of one report template; a document using
//! other wording yields empty fields rather than an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::nlp::{EntityLabel, EntityRecognizer};
use crate::utils::sentences::split_sentences;

const FICO_ANCHOR: &str = "FICO";
const SCORE_ANCHOR: &str = "Score";
const OPEN_ACCOUNTS_ANCHOR: &str = "Open accounts";
const ACCOUNTS_EVER_LATE_ANCHOR: &str = "Accounts ever late";

/// Fields pulled from a credit report. Unmatched fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub name: String,
    pub credit_score: String,
    pub open_accounts: String,
    pub accounts_ever_late: String,
}

#[derive(Clone)]
pub struct FieldExtractor {
    recognizer: Arc<dyn EntityRecognizer>,
}

impl FieldExtractor {
    pub fn new(recognizer: Arc<dyn EntityRecognizer>) -> Self {
        Self { recognizer }
    }

    pub fn model_id(&self) -> &str {
        self.recognizer.model_id()
    }

    /// Extracts the four report fields from `text`. Never fails: a field
    /// without a match is the empty string.
    pub fn extract_information(&self, text: &str) -> ExtractionResult {
        let sentences = split_sentences(text);
        debug!(sentences = sentences.len(), chars = text.len(), "Scanning document text");

        ExtractionResult {
            name: self.person_name(text),
            credit_score: credit_score(&sentences),
            open_accounts: value_after_colon(&sentences, OPEN_ACCOUNTS_ANCHOR),
            accounts_ever_late: value_after_colon(&sentences, ACCOUNTS_EVER_LATE_ANCHOR),
        }
    }

    fn person_name(&self, text: &str) -> String {
        match self.recognizer.first_entity(text, EntityLabel::Person) {
            Ok(Some(entity)) => entity.text,
            Ok(None) => String::new(),
            Err(e) => {
                warn!("Entity recognition failed, leaving name empty: {}", e);
                String::new()
            }
        }
    }
}

/// Text after the last "Score" in the first sentence mentioning both "FICO"
/// and "Score".
pub fn credit_score(sentences: &[&str]) -> String {
    sentences
        .iter()
        .find(|s| s.contains(FICO_ANCHOR) && s.contains(SCORE_ANCHOR))
        .map(|s| after_last(s, SCORE_ANCHOR))
        .unwrap_or_default()
}

/// Text after the last colon in the first sentence containing `anchor`. A
/// sentence without a colon yields the whole sentence.
pub fn value_after_colon(sentences: &[&str], anchor: &str) -> String {
    sentences
        .iter()
        .find(|s| s.contains(anchor))
        .map(|s| after_last(s, ":"))
        .unwrap_or_default()
}

fn after_last(sentence: &str, separator: &str) -> String {
    match sentence.rfind(separator) {
        Some(idx) => sentence[idx + separator.len()..].trim().to_string(),
        None => sentence.trim().to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::nlp::{Entity, NerError};

    /// Recognizes a fixed list of person names by substring search, in
    /// order of appearance.
    pub(crate) struct StubRecognizer {
        pub names: Vec<&'static str>,
    }

    impl EntityRecognizer for StubRecognizer {
        fn entities(&self, text: &str) -> Result<Vec<Entity>, NerError> {
            let mut found: Vec<Entity> = self
                .names
                .iter()
                .filter_map(|name| {
                    text.find(name).map(|start| Entity {
                        label: EntityLabel::Person,
                        text: name.to_string(),
                        start,
                        end: start + name.len(),
                    })
                })
                .collect();
            found.sort_by_key(|e| e.start);
            Ok(found)
        }

        fn model_id(&self) -> &str {
            "stub"
        }
    }

    struct FailingRecognizer;

    impl EntityRecognizer for FailingRecognizer {
        fn entities(&self, _text: &str) -> Result<Vec<Entity>, NerError> {
            Err(NerError::Tokenize("boom".to_string()))
        }

        fn model_id(&self) -> &str {
            "failing"
        }
    }

    fn extractor(names: Vec<&'static str>) -> FieldExtractor {
        FieldExtractor::new(Arc::new(StubRecognizer { names }))
    }

    const REPORT: &str = "Credit Report\n\
        Prepared for Jane Doe on behalf of Acme Lending.\n\
        Your FICO Score 8 is 742.\n\
        Open accounts: 5\n\
        Accounts ever late: 1\n\
        Reviewed by John Smith.";

    #[test]
    fn extracts_all_fields_from_template() {
        let result = extractor(vec!["John Smith", "Jane Doe"]).extract_information(REPORT);
        assert_eq!(result.name, "Jane Doe");
        assert_eq!(result.credit_score, "8 is 742.");
        assert_eq!(result.open_accounts, "5");
        assert_eq!(result.accounts_ever_late, "1");
    }

    #[test]
    fn absent_phrases_yield_empty_strings() {
        let result = extractor(vec![]).extract_information("Nothing relevant here. At all.");
        assert_eq!(result, ExtractionResult::default());
    }

    #[test]
    fn result_serializes_with_snake_case_keys() {
        let value = serde_json::to_value(ExtractionResult::default()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "name": "",
                "credit_score": "",
                "open_accounts": "",
                "accounts_ever_late": ""
            })
        );
    }

    #[test]
    fn credit_score_takes_text_after_last_score_of_first_match() {
        let sentences = [
            "Score history is shown below.",
            "FICO Score: Score 701",
            "FICO Score: 650",
        ];
        assert_eq!(credit_score(&sentences), "701");
    }

    #[test]
    fn credit_score_needs_both_anchors() {
        let sentences = ["Client's Credit Score: 742", "Report generated by FICO."];
        assert_eq!(credit_score(&sentences), "");

        let sentences = ["Client's FICO Credit Score: 742"];
        assert_eq!(credit_score(&sentences), ": 742");
    }

    #[test]
    fn anchors_are_case_sensitive() {
        let sentences = ["fico score 700", "OPEN ACCOUNTS: 3", "open accounts: 4"];
        assert_eq!(credit_score(&sentences), "");
        assert_eq!(value_after_colon(&sentences, OPEN_ACCOUNTS_ANCHOR), "");
    }

    #[test]
    fn colon_values_use_last_colon() {
        let sentences = ["Open accounts as of 01/02/2024 10:30: 7"];
        assert_eq!(value_after_colon(&sentences, OPEN_ACCOUNTS_ANCHOR), "7");
    }

    #[test]
    fn sentence_without_colon_yields_whole_sentence() {
        let sentences = ["  Accounts ever late none  "];
        assert_eq!(
            value_after_colon(&sentences, ACCOUNTS_EVER_LATE_ANCHOR),
            "Accounts ever late none"
        );
    }

    #[test]
    fn first_matching_sentence_wins() {
        let text = "Open accounts: 2\nOpen accounts: 9";
        let result = extractor(vec![]).extract_information(text);
        assert_eq!(result.open_accounts, "2");
    }

    #[test]
    fn recognizer_failure_leaves_name_empty() {
        let result = FieldExtractor::new(Arc::new(FailingRecognizer)).extract_information(REPORT);
        assert_eq!(result.name, "");
        assert_eq!(result.open_accounts, "5");
    }

    #[test]
    fn repeated_extraction_is_identical() {
        let ex = extractor(vec!["Jane Doe"]);
        assert_eq!(ex.extract_information(REPORT), ex.extract_information(REPORT));
    }
}
