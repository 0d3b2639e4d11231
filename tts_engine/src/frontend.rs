//! Table-driven frontend for pre-phonemized input.
//!
//! Text is expected as whitespace-separated phone symbols; sentence-final
//! punctuation splits it into sentences. Symbols are mapped to ids through
//! `phone id` tables. No grapheme-to-phoneme conversion happens here.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, TtsError};
use crate::model::{Language, PhoneticSentence, TextFrontend};

const SENTENCE_BREAKS: &[char] = &['。', '！', '？', '；', '.', '!', '?', ';', '\n'];

/// Load a `symbol id` table, one entry per line.
pub fn load_id_table<P: AsRef<Path>>(p: P) -> Result<HashMap<String, i64>> {
    let path = p.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| TtsError::Configuration(format!("Failed to read {}: {e}", path.display())))?;
    parse_id_table(&text)
        .map_err(|msg| TtsError::Configuration(format!("{}: {msg}", path.display())))
}

fn parse_id_table(text: &str) -> std::result::Result<HashMap<String, i64>, String> {
    let mut table = HashMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(symbol), Some(id), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("line {}: expected '<symbol> <id>'", lineno + 1));
        };
        let id: i64 = id
            .parse()
            .map_err(|_| format!("line {}: invalid id '{id}'", lineno + 1))?;
        table.insert(symbol.to_string(), id);
    }
    Ok(table)
}

#[derive(Debug, Clone)]
pub struct PhoneTableFrontend {
    lang: Language,
    phones: HashMap<String, i64>,
    tones: Option<HashMap<String, i64>>,
}

impl PhoneTableFrontend {
    pub fn new(lang: Language, phones: HashMap<String, i64>, tones: Option<HashMap<String, i64>>) -> Self {
        Self { lang, phones, tones }
    }

    pub fn from_files(lang: Language, phones_dict: &Path, tones_dict: Option<&Path>) -> Result<Self> {
        let phones = load_id_table(phones_dict)?;
        let tones = tones_dict.map(load_id_table).transpose()?;
        Ok(Self::new(lang, phones, tones))
    }

    fn phone_id(&self, symbol: &str) -> Result<i64> {
        self.phones
            .get(symbol)
            .copied()
            .ok_or_else(|| TtsError::InvalidRequest(format!("unknown phone symbol '{symbol}'")))
    }

    fn sentence(&self, tokens: &[&str], with_tones: bool) -> Result<PhoneticSentence> {
        if !with_tones {
            let phone_ids = tokens.iter().map(|t| self.phone_id(t)).collect::<Result<_>>()?;
            return Ok(PhoneticSentence { phone_ids, tone_ids: None });
        }

        let tones = self.tones.as_ref().ok_or_else(|| {
            TtsError::Configuration("tone ids requested but no tones_dict is loaded".to_string())
        })?;
        let mut phone_ids = Vec::with_capacity(tokens.len());
        let mut tone_ids = Vec::with_capacity(tokens.len());
        for token in tokens {
            let (phone, tone) = split_tone(token);
            phone_ids.push(self.phone_id(phone)?);
            let tone_id = tones
                .get(tone)
                .copied()
                .ok_or_else(|| TtsError::InvalidRequest(format!("unknown tone '{tone}' in '{token}'")))?;
            tone_ids.push(tone_id);
        }
        Ok(PhoneticSentence {
            phone_ids,
            tone_ids: Some(tone_ids),
        })
    }
}

/// `ai2` -> (`ai`, `2`); symbols without a trailing digit get tone `0`.
fn split_tone(token: &str) -> (&str, &str) {
    match token.char_indices().last() {
        Some((i, c)) if c.is_ascii_digit() && i > 0 => (&token[..i], &token[i..]),
        _ => (token, "0"),
    }
}

impl TextFrontend for PhoneTableFrontend {
    fn supports(&self, lang: Language) -> bool {
        lang == self.lang
    }

    fn to_phonetic(&self, text: &str, lang: Language, with_tones: bool) -> Result<Vec<PhoneticSentence>> {
        if !self.supports(lang) {
            return Err(TtsError::Configuration(format!(
                "frontend is set up for '{}', not '{lang}'",
                self.lang
            )));
        }
        text.split(SENTENCE_BREAKS)
            .map(|s| s.split_whitespace().collect::<Vec<_>>())
            .filter(|tokens| !tokens.is_empty())
            .map(|tokens| self.sentence(&tokens, with_tones))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, i64)]) -> HashMap<String, i64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_parse_id_table() {
        let t = parse_id_table("<pad> 0\na1 1\n\n  b 2  \n").unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t["b"], 2);
        assert!(parse_id_table("a\n").is_err());
        assert!(parse_id_table("a x\n").is_err());
    }

    #[test]
    fn test_sentences_split_on_punctuation() {
        let fe = PhoneTableFrontend::new(Language::En, table(&[("HH", 1), ("AH0", 2), ("L", 3)]), None);
        let out = fe.to_phonetic("HH AH0 L. L AH0!  ", Language::En, false).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].phone_ids, vec![1, 2, 3]);
        assert_eq!(out[1].phone_ids, vec![3, 2]);
        assert!(out[0].tone_ids.is_none());
    }

    #[test]
    fn test_tones_split_from_symbols() {
        let fe = PhoneTableFrontend::new(
            Language::Zh,
            table(&[("n", 1), ("i", 2), ("h", 3), ("ao", 4)]),
            Some(table(&[("0", 0), ("3", 3)])),
        );
        let out = fe.to_phonetic("n i3 h ao3。", Language::Zh, true).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].phone_ids, vec![1, 2, 3, 4]);
        assert_eq!(out[0].tone_ids, Some(vec![0, 3, 0, 3]));
    }

    #[test]
    fn test_unknown_symbol_and_language() {
        let fe = PhoneTableFrontend::new(Language::Zh, table(&[("a", 1)]), None);
        assert!(matches!(
            fe.to_phonetic("a b", Language::Zh, false),
            Err(TtsError::InvalidRequest(_))
        ));
        assert!(!fe.supports(Language::En));
        assert!(matches!(
            fe.to_phonetic("a", Language::En, false),
            Err(TtsError::Configuration(_))
        ));
    }
}
