///
/// Built-in Extensions
///
/// Ready-made extensions built on the public API:
///
/// ## Functions (deterministic, one argument)
/// - `unicode_upper(text)` - Unicode uppercase
/// - `unicode_lower(text)` - Unicode lowercase
/// - `unicode_capitalize(text)` - first letter of each word uppercased, the
///   rest lowercased
///
/// NULL and non-text arguments are returned unchanged.
///
/// ## Collations
/// - `unicode` - code point order
/// - `unicode_nocase` - code point order of the lowercased strings
///
/// ## Tokenizers
/// - `unicode_words` - Unicode word boundaries (UAX #29), tokens lowercased
///   unless created with the `case_sensitive` argument
///

use std::cmp::Ordering;

use unicode_segmentation::UnicodeSegmentation;

use crate::collation::DatabaseCollation;
use crate::database::Database;
use crate::error::{BoxError, DatabaseError, ExtensionError, ResultCode};
use crate::fts5::{CustomTokenizer, TokenFlags, TokenSink, TokenizeFlags, Tokenizer, TokenizerHost};
use crate::function::{Arity, DatabaseFunction};
use crate::value::DatabaseValue;

pub const FUNCTION_NAMES: &[&str] = &["unicode_upper", "unicode_lower", "unicode_capitalize"];
pub const COLLATION_NAMES: &[&str] = &["unicode", "unicode_nocase"];
pub const TOKENIZER_NAMES: &[&str] = &[UnicodeWordsTokenizer::NAME];

fn text_function(name: &str, transform: fn(&str) -> String) -> DatabaseFunction {
    DatabaseFunction::new(name, Arity::Fixed(1), move |args: &[DatabaseValue]| {
        Ok::<_, BoxError>(match args.first() {
            Some(DatabaseValue::Text(text)) => DatabaseValue::Text(transform(text)),
            Some(other) => other.clone(),
            None => DatabaseValue::Null,
        })
    })
    .deterministic()
}

pub fn unicode_upper() -> DatabaseFunction {
    text_function("unicode_upper", str::to_uppercase)
}

pub fn unicode_lower() -> DatabaseFunction {
    text_function("unicode_lower", str::to_lowercase)
}

pub fn unicode_capitalize() -> DatabaseFunction {
    text_function("unicode_capitalize", capitalize)
}

fn capitalize(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for segment in text.split_word_bounds() {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) if first.is_alphanumeric() => {
                result.extend(first.to_uppercase());
                result.push_str(&chars.as_str().to_lowercase());
            }
            _ => result.push_str(segment),
        }
    }
    result
}

pub fn unicode_compare() -> DatabaseCollation {
    DatabaseCollation::new("unicode", |left, right| left.cmp(right))
}

pub fn unicode_nocase() -> DatabaseCollation {
    DatabaseCollation::new("unicode_nocase", compare_nocase)
}

fn compare_nocase(left: &str, right: &str) -> Ordering {
    left.to_lowercase().cmp(&right.to_lowercase())
}

pub fn function_named(name: &str) -> Option<DatabaseFunction> {
    match name {
        "unicode_upper" => Some(unicode_upper()),
        "unicode_lower" => Some(unicode_lower()),
        "unicode_capitalize" => Some(unicode_capitalize()),
        _ => None,
    }
}

pub fn collation_named(name: &str) -> Option<DatabaseCollation> {
    match name {
        "unicode" => Some(unicode_compare()),
        "unicode_nocase" => Some(unicode_nocase()),
        _ => None,
    }
}

/// Registers the built-in tokenizer called `name`. Returns `Ok(false)` when
/// there is no such built-in.
pub fn register_tokenizer_named(db: &Database, name: &str) -> Result<bool, ExtensionError> {
    match name {
        UnicodeWordsTokenizer::NAME => {
            db.register_tokenizer::<UnicodeWordsTokenizer>()?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Splits text on Unicode word boundaries. Token offsets always refer to the
/// original text, also when the token itself is lowercased.
#[derive(Debug, Clone, Default)]
pub struct UnicodeWordsTokenizer {
    case_sensitive: bool,
}

impl UnicodeWordsTokenizer {
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

impl CustomTokenizer for UnicodeWordsTokenizer {
    const NAME: &'static str = "unicode_words";

    fn new(_host: &TokenizerHost, arguments: &[String]) -> Result<Self, BoxError> {
        let mut tokenizer = UnicodeWordsTokenizer::default();
        let mut arguments = arguments.iter();
        while let Some(argument) = arguments.next() {
            match argument.as_str() {
                "case_sensitive" => {
                    // optional 0/1 value, as unicode61 takes for its options
                    tokenizer.case_sensitive = match arguments.as_slice().first().map(String::as_str) {
                        Some("0") => {
                            arguments.next();
                            false
                        }
                        Some("1") => {
                            arguments.next();
                            true
                        }
                        _ => true,
                    };
                }
                other => {
                    return Err(Box::new(
                        DatabaseError::new(ResultCode::ERROR)
                            .with_message(format!("unknown {} argument '{}'", Self::NAME, other)),
                    ));
                }
            }
        }
        Ok(tokenizer)
    }
}

impl Tokenizer for UnicodeWordsTokenizer {
    fn tokenize(
        &mut self,
        text: &str,
        _flags: TokenizeFlags,
        tokens: &mut TokenSink,
    ) -> Result<(), BoxError> {
        for (start, word) in text.unicode_word_indices() {
            let range = start..start + word.len();
            if self.case_sensitive {
                tokens.emit(word, range, TokenFlags::NONE)?;
            } else {
                tokens.emit(&word.to_lowercase(), range, TokenFlags::NONE)?;
            }
        }
        Ok(())
    }
}
