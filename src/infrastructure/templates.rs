use crate::domain::participant::LanguageCode;
use crate::domain::ports::{RenderedTemplate, TemplateCatalog};
use crate::error::{Result, SantaError};
use std::collections::HashMap;
use tracing::warn;

const PAIRING_PLACEHOLDER: &str = "{pairing}";

/// Texts of one language. `body` carries a `{pairing}` placeholder for the
/// recipient's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub subject: String,
    pub greeting: String,
    pub body: String,
    pub note_label: String,
    pub signature: String,
}

impl Template {
    fn compose(&self, recipient_name: &str, custom_note: Option<&str>) -> String {
        let mut text = format!(
            "{},\n\n{}",
            self.greeting,
            self.body.replace(PAIRING_PLACEHOLDER, recipient_name)
        );
        if let Some(note) = custom_note.map(str::trim).filter(|n| !n.is_empty()) {
            text.push_str(&format!("\n\n{}: {}", self.note_label, note));
        }
        text.push_str("\n\n");
        text.push_str(&self.signature);
        text
    }
}

/// In-process catalog shipping Romanian, English and German texts.
pub struct BuiltinCatalog {
    templates: HashMap<LanguageCode, Template>,
    default_language: LanguageCode,
}

impl Default for BuiltinCatalog {
    fn default() -> Self {
        Self::new(LanguageCode::from("en"))
    }
}

impl BuiltinCatalog {
    pub fn new(default_language: LanguageCode) -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            LanguageCode::from("en"),
            Template {
                subject: "Your Secret Santa pairing".to_string(),
                greeting: "Hello".to_string(),
                body: "You are the Secret Santa for {pairing}! Keep it a secret and have fun choosing a gift.".to_string(),
                note_label: "Message from the organizer".to_string(),
                signature: "Happy holidays!\nThe Secret Santa team".to_string(),
            },
        );
        templates.insert(
            LanguageCode::from("ro"),
            Template {
                subject: "Perechea ta de Secret Santa".to_string(),
                greeting: "Salut".to_string(),
                body: "Tu ești Moșul secret pentru {pairing}! Păstrează secretul și distrează-te alegând un cadou.".to_string(),
                note_label: "Mesaj de la organizator".to_string(),
                signature: "Sărbători fericite!\nEchipa Secret Santa".to_string(),
            },
        );
        templates.insert(
            LanguageCode::from("de"),
            Template {
                subject: "Dein Wichtelpartner".to_string(),
                greeting: "Hallo".to_string(),
                body: "Du bist der Wichtel für {pairing}! Behalte es für dich und hab Spaß beim Aussuchen eines Geschenks.".to_string(),
                note_label: "Nachricht vom Organisator".to_string(),
                signature: "Frohe Feiertage!\nDein Wichtel-Team".to_string(),
            },
        );
        Self {
            templates,
            default_language,
        }
    }

    /// Adds or replaces the texts for `language`.
    pub fn with_template(mut self, language: LanguageCode, template: Template) -> Self {
        self.templates.insert(language, template);
        self
    }
}

impl TemplateCatalog for BuiltinCatalog {
    fn render(
        &self,
        language: &LanguageCode,
        recipient_name: &str,
        custom_note: Option<&str>,
    ) -> Result<RenderedTemplate> {
        let (resolved, template) = match self.templates.get(language) {
            Some(template) => (language, template),
            None => {
                let fallback = self
                    .templates
                    .get(&self.default_language)
                    .ok_or_else(|| SantaError::UnknownLanguage(language.clone()))?;
                warn!(
                    requested = %language,
                    fallback = %self.default_language,
                    "unknown language, using default"
                );
                (&self.default_language, fallback)
            }
        };

        Ok(RenderedTemplate {
            language: resolved.clone(),
            subject: template.subject.clone(),
            body: template.compose(recipient_name, custom_note),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_recipient() {
        let catalog = BuiltinCatalog::default();
        let rendered = catalog.render(&"en".into(), "Maria", None).unwrap();

        assert_eq!(rendered.subject, "Your Secret Santa pairing");
        assert_eq!(
            rendered.body,
            "Hello,\n\nYou are the Secret Santa for Maria! Keep it a secret and have fun choosing a gift.\n\nHappy holidays!\nThe Secret Santa team"
        );
    }

    #[test]
    fn test_custom_note_is_appended_with_label() {
        let catalog = BuiltinCatalog::default();
        let rendered = catalog
            .render(&"de".into(), "Jonas", Some("Budget 20 EUR"))
            .unwrap();

        assert!(rendered.body.contains("Wichtel für Jonas"));
        assert!(rendered.body.contains("Nachricht vom Organisator: Budget 20 EUR"));
        assert!(rendered.body.ends_with("Dein Wichtel-Team"));
    }

    #[test]
    fn test_blank_note_is_omitted() {
        let catalog = BuiltinCatalog::default();
        let with_blank = catalog.render(&"ro".into(), "Ion", Some("   ")).unwrap();
        let without = catalog.render(&"ro".into(), "Ion", None).unwrap();
        assert_eq!(with_blank, without);
        assert!(!with_blank.body.contains("organizator"));
    }

    #[test]
    fn test_unknown_language_falls_back_to_default() {
        let catalog = BuiltinCatalog::default();
        let rendered = catalog.render(&"fr".into(), "Luc", None).unwrap();
        assert_eq!(rendered.language, LanguageCode::from("en"));
        assert!(rendered.body.contains("Luc"));
    }

    #[test]
    fn test_unknown_language_without_default_is_an_error() {
        let catalog = BuiltinCatalog::new("xx".into());
        assert!(matches!(
            catalog.render(&"fr".into(), "Luc", None),
            Err(SantaError::UnknownLanguage(code)) if code.as_str() == "fr"
        ));
    }

    #[test]
    fn test_added_template_is_rendered() {
        let catalog = BuiltinCatalog::default().with_template(
            "es".into(),
            Template {
                subject: "Tu amigo invisible".to_string(),
                greeting: "Hola".to_string(),
                body: "Eres el amigo invisible de {pairing}.".to_string(),
                note_label: "Mensaje".to_string(),
                signature: "Felices fiestas".to_string(),
            },
        );
        let rendered = catalog.render(&"ES".into(), "Luc", None).unwrap();
        assert_eq!(rendered.language, LanguageCode::from("es"));
        assert_eq!(rendered.subject, "Tu amigo invisible");
        assert_eq!(
            rendered.body,
            "Hola,\n\nEres el amigo invisible de Luc.\n\nFelices fiestas"
        );
    }
}
