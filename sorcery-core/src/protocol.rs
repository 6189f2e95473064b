//! The narrator wire format.
//!
//! Every narrator reply must consist of exactly three sections:
//!
//! ```text
//! [SCENE]
//! Rain hammers the roof of the inn. Mira slides a key across the bar.
//! [CHOICES]
//! 1. Take the key {intent: take silver_key}
//! 2. Pay for a room {requires: gold >= 5} {intent: spend gold 5}
//! 3. Ask Mira about the mill {intent: talk mira about the mill}
//! [MODE]
//! normal
//! ```
//!
//! [`decode`] turns that text into a [`Turn`] or a [`ParseFailure`] with a
//! machine-readable reason. It is total and deterministic: the same input
//! and catalogue always give the same result, and no input panics. Text
//! that does not fit the grammar is rejected, never guessed at.

use crate::rules::{Choice, Intent, Requirement};
use crate::world::{CharacterId, EntityRef, GameState, ItemId, LocationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What the codec needs to know about the world to check references.
pub trait EntityCatalog {
    fn has_item(&self, id: &ItemId) -> bool;
    fn has_character(&self, id: &CharacterId) -> bool;
    fn has_location(&self, id: &LocationId) -> bool;
    fn has_stat(&self, name: &str) -> bool;

    fn has(&self, entity: &EntityRef) -> bool {
        match entity {
            EntityRef::Item(id) => self.has_item(id),
            EntityRef::Character(id) => self.has_character(id),
            EntityRef::Location(id) => self.has_location(id),
            EntityRef::Stat(name) => self.has_stat(name),
        }
    }
}

impl EntityCatalog for GameState {
    fn has_item(&self, id: &ItemId) -> bool {
        self.inventory.knows(id)
    }

    fn has_character(&self, id: &CharacterId) -> bool {
        self.characters.contains_key(id)
    }

    fn has_location(&self, id: &LocationId) -> bool {
        self.locations.contains_key(id)
    }

    fn has_stat(&self, name: &str) -> bool {
        self.stats.has(name)
    }
}

// ============================================================================
// Turn
// ============================================================================

/// The interaction mode the narrator asks for next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeDirective {
    Normal,
    Dialogue(CharacterId),
}

impl fmt::Display for ModeDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeDirective::Normal => f.write_str("normal"),
            ModeDirective::Dialogue(character) => write!(f, "dialogue {character}"),
        }
    }
}

/// One decoded narrator reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub scene: String,
    pub choices: Vec<Choice>,
    pub directive: ModeDirective,
}

impl Turn {
    /// Render back into wire format.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push_str("[SCENE]\n");
        out.push_str(self.scene.trim());
        out.push_str("\n[CHOICES]\n");
        for (i, choice) in self.choices.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, choice.to_wire()));
        }
        out.push_str("[MODE]\n");
        out.push_str(&self.directive.to_string());
        out.push('\n');
        out
    }
}

// ============================================================================
// Failures
// ============================================================================

/// The three sections of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Scene,
    Choices,
    Mode,
}

impl Section {
    fn from_header(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SCENE" => Some(Section::Scene),
            "CHOICES" => Some(Section::Choices),
            "MODE" => Some(Section::Mode),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Section::Scene => 0,
            Section::Choices => 1,
            Section::Mode => 2,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Section::Scene => "[SCENE]",
            Section::Choices => "[CHOICES]",
            Section::Mode => "[MODE]",
        })
    }
}

/// Why a reply was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailureReason {
    MissingScene,
    MissingChoices,
    MissingModeDirective,
    DuplicateSection(Section),
    UnknownSection(String),
    StrayContent,
    EmptyScene,
    NoChoices,
    MalformedChoice { number: usize, detail: String },
    UnknownEntity(EntityRef),
    UnknownMode(String),
    ModeMismatch(String),
    /// Every choice failed its requirements against the current state.
    NoOfferableChoices,
}

impl ParseFailureReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ParseFailureReason::MissingScene => "missing_scene",
            ParseFailureReason::MissingChoices => "missing_choices",
            ParseFailureReason::MissingModeDirective => "missing_mode_directive",
            ParseFailureReason::DuplicateSection(_) => "duplicate_section",
            ParseFailureReason::UnknownSection(_) => "unknown_section",
            ParseFailureReason::StrayContent => "stray_content",
            ParseFailureReason::EmptyScene => "empty_scene",
            ParseFailureReason::NoChoices => "no_choices",
            ParseFailureReason::MalformedChoice { .. } => "malformed_choice",
            ParseFailureReason::UnknownEntity(_) => "unknown_entity",
            ParseFailureReason::UnknownMode(_) => "unknown_mode",
            ParseFailureReason::ModeMismatch(_) => "mode_mismatch",
            ParseFailureReason::NoOfferableChoices => "no_offerable_choices",
        }
    }
}

impl fmt::Display for ParseFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseFailureReason::MissingScene => f.write_str("the [SCENE] section is missing"),
            ParseFailureReason::MissingChoices => f.write_str("the [CHOICES] section is missing"),
            ParseFailureReason::MissingModeDirective => {
                f.write_str("the [MODE] section is missing or empty")
            }
            ParseFailureReason::DuplicateSection(section) => {
                write!(f, "{section} appears more than once")
            }
            ParseFailureReason::UnknownSection(name) => write!(f, "unknown section [{name}]"),
            ParseFailureReason::StrayContent => {
                f.write_str("text appears before the first section header")
            }
            ParseFailureReason::EmptyScene => f.write_str("the [SCENE] section is empty"),
            ParseFailureReason::NoChoices => f.write_str("the [CHOICES] section lists no choices"),
            ParseFailureReason::MalformedChoice { number, detail } => {
                write!(f, "choice {number} is malformed: {detail}")
            }
            ParseFailureReason::UnknownEntity(entity) => {
                write!(f, "reference to unknown {entity}")
            }
            ParseFailureReason::UnknownMode(mode) => write!(f, "unknown mode '{mode}'"),
            ParseFailureReason::ModeMismatch(detail) => write!(f, "bad mode directive: {detail}"),
            ParseFailureReason::NoOfferableChoices => {
                f.write_str("no choice is possible with the player's current resources")
            }
        }
    }
}

/// A narrator reply that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ParseFailure {
    pub reason: ParseFailureReason,
    /// 1-based line of the raw reply, when the failure has one.
    pub line: Option<usize>,
}

impl ParseFailure {
    pub fn new(reason: ParseFailureReason) -> Self {
        Self { reason, line: None }
    }

    fn at(reason: ParseFailureReason, line: usize) -> Self {
        Self {
            reason,
            line: Some(line),
        }
    }

    pub fn code(&self) -> &'static str {
        self.reason.code()
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a raw narrator reply, checking every reference against `catalog`.
pub fn decode(raw: &str, catalog: &impl EntityCatalog) -> Result<Turn, ParseFailure> {
    let sections = split_sections(raw)?;

    let [scene, choices, mode] = sections;
    let scene = scene.ok_or_else(|| ParseFailure::new(ParseFailureReason::MissingScene))?;
    let choices = choices.ok_or_else(|| ParseFailure::new(ParseFailureReason::MissingChoices))?;
    let mode = mode.ok_or_else(|| ParseFailure::new(ParseFailureReason::MissingModeDirective))?;

    let scene_text = join_scene(&scene.lines);
    if scene_text.is_empty() {
        return Err(ParseFailure::at(ParseFailureReason::EmptyScene, scene.header_line));
    }

    let mut parsed = Vec::new();
    for (line_no, line) in choices.lines.iter().filter(|(_, l)| !l.trim().is_empty()) {
        let number = parsed.len() + 1;
        let choice = parse_choice_line(line, number).map_err(|detail| {
            ParseFailure::at(ParseFailureReason::MalformedChoice { number, detail }, *line_no)
        })?;
        parsed.push((*line_no, choice));
    }
    if parsed.is_empty() {
        return Err(ParseFailure::at(ParseFailureReason::NoChoices, choices.header_line));
    }

    let directive = parse_directive(&mode)?;

    for (line_no, choice) in &parsed {
        for entity in choice.refs() {
            if !catalog.has(&entity) {
                return Err(ParseFailure::at(ParseFailureReason::UnknownEntity(entity), *line_no));
            }
        }
    }
    if let ModeDirective::Dialogue(character) = &directive {
        if !catalog.has_character(character) {
            return Err(ParseFailure::at(
                ParseFailureReason::UnknownEntity(EntityRef::Character(character.clone())),
                mode.header_line,
            ));
        }
    }

    Ok(Turn {
        scene: scene_text,
        choices: parsed.into_iter().map(|(_, c)| c).collect(),
        directive,
    })
}

struct SectionBody<'a> {
    header_line: usize,
    lines: Vec<(usize, &'a str)>,
}

fn split_sections(raw: &str) -> Result<[Option<SectionBody<'_>>; 3], ParseFailure> {
    let mut sections: [Option<SectionBody<'_>>; 3] = [None, None, None];
    let mut current: Option<Section> = None;

    for (index, line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();

        if let Some(name) = header_name(trimmed) {
            let section = Section::from_header(name).ok_or_else(|| {
                ParseFailure::at(ParseFailureReason::UnknownSection(name.to_string()), line_no)
            })?;
            let slot = &mut sections[section.index()];
            if slot.is_some() {
                return Err(ParseFailure::at(
                    ParseFailureReason::DuplicateSection(section),
                    line_no,
                ));
            }
            *slot = Some(SectionBody {
                header_line: line_no,
                lines: Vec::new(),
            });
            current = Some(section);
            continue;
        }

        match current {
            Some(section) => {
                if let Some(body) = sections[section.index()].as_mut() {
                    body.lines.push((line_no, line));
                }
            }
            None if trimmed.is_empty() => {}
            None => return Err(ParseFailure::at(ParseFailureReason::StrayContent, line_no)),
        }
    }
    Ok(sections)
}

/// `[NAME]` where NAME is upper-case letters or underscores, or one of the
/// known headers in any case. Other bracketed text is ordinary narration.
fn header_name(line: &str) -> Option<&str> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    if inner.is_empty() {
        return None;
    }
    let shouting = inner.chars().all(|c| c.is_ascii_uppercase() || c == '_');
    (shouting || Section::from_header(inner).is_some()).then_some(inner)
}

fn join_scene(lines: &[(usize, &str)]) -> String {
    let text: Vec<&str> = lines.iter().map(|(_, l)| l.trim_end()).collect();
    text.join("\n").trim().to_string()
}

fn parse_directive(mode: &SectionBody<'_>) -> Result<ModeDirective, ParseFailure> {
    let mut directives = mode.lines.iter().filter(|(_, l)| !l.trim().is_empty());
    let (line_no, line) = directives
        .next()
        .ok_or_else(|| ParseFailure::at(ParseFailureReason::MissingModeDirective, mode.header_line))?;
    if let Some((extra, _)) = directives.next() {
        return Err(ParseFailure::at(
            ParseFailureReason::ModeMismatch("more than one directive".to_string()),
            *extra,
        ));
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let keyword = tokens.first().map(|t| t.to_ascii_lowercase()).unwrap_or_default();
    match (keyword.as_str(), tokens.get(1..).unwrap_or_default()) {
        ("normal", []) => Ok(ModeDirective::Normal),
        ("normal", _) => Err(ParseFailure::at(
            ParseFailureReason::ModeMismatch("normal takes no arguments".to_string()),
            *line_no,
        )),
        ("dialogue", [character]) => CharacterId::parse(character)
            .map(ModeDirective::Dialogue)
            .ok_or_else(|| {
                ParseFailure::at(
                    ParseFailureReason::ModeMismatch(format!("'{character}' is not a character id")),
                    *line_no,
                )
            }),
        ("dialogue", _) => Err(ParseFailure::at(
            ParseFailureReason::ModeMismatch("dialogue needs exactly one character id".to_string()),
            *line_no,
        )),
        _ => Err(ParseFailure::at(
            ParseFailureReason::UnknownMode(tokens.first().copied().unwrap_or_default().to_string()),
            *line_no,
        )),
    }
}

/// Parse `N. label {requires: ...} {intent: ...}`.
fn parse_choice_line(line: &str, expected: usize) -> Result<Choice, String> {
    let line = line.trim();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return Err("line does not start with a choice number".to_string());
    }
    let number: usize = line[..digits]
        .parse()
        .map_err(|_| "choice number is out of range".to_string())?;
    if number != expected {
        return Err(format!("numbered {number}, expected {expected}"));
    }
    let rest = line[digits..]
        .strip_prefix('.')
        .or_else(|| line[digits..].strip_prefix(')'))
        .ok_or_else(|| "choice number must be followed by '.'".to_string())?;

    let mut body = rest.trim();
    let mut requirements: Option<Vec<Requirement>> = None;
    let mut intent: Option<Intent> = None;

    while let Some(without_close) = body.strip_suffix('}') {
        let open = without_close
            .rfind('{')
            .ok_or_else(|| "unbalanced '}'".to_string())?;
        let tag = &without_close[open + 1..];
        body = without_close[..open].trim_end();

        let (key, value) = tag
            .split_once(':')
            .ok_or_else(|| format!("tag '{{{tag}}}' has no ':'"))?;
        match key.trim().to_ascii_lowercase().as_str() {
            "requires" if requirements.is_none() => {
                requirements = Some(parse_requirements(value)?);
            }
            "intent" if intent.is_none() => {
                intent = Some(parse_intent(value)?);
            }
            "requires" | "intent" => return Err(format!("duplicate '{}' tag", key.trim())),
            other => return Err(format!("unknown tag '{other}'")),
        }
    }

    if body.contains(&['{', '}'][..]) {
        return Err("tags must come after the label".to_string());
    }
    if body.is_empty() {
        return Err("label is empty".to_string());
    }

    Ok(Choice {
        label: body.to_string(),
        requirements: requirements.unwrap_or_default(),
        intent: intent.unwrap_or(Intent::Act),
    })
}

fn parse_requirements(value: &str) -> Result<Vec<Requirement>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("empty requires tag".to_string());
    }
    value.split(',').map(parse_requirement).collect()
}

/// `stat >= n`, `item id >= n` or `item id`.
fn parse_requirement(raw: &str) -> Result<Requirement, String> {
    let spaced = raw.replace(">=", " >= ");
    let tokens: Vec<&str> = spaced.split_whitespace().collect();
    match tokens.as_slice() {
        ["item", item] => Ok(Requirement::ItemAtLeast {
            item: item_id(item)?,
            quantity: 1,
        }),
        ["item", item, ">=", n] => Ok(Requirement::ItemAtLeast {
            item: item_id(item)?,
            quantity: positive(n)?,
        }),
        [stat, ">=", n] => Ok(Requirement::StatAtLeast {
            stat: stat_name(stat)?,
            amount: i64::from(positive(n)?),
        }),
        _ => Err(format!("cannot read requirement '{}'", raw.trim())),
    }
}

fn parse_intent(raw: &str) -> Result<Intent, String> {
    let raw = raw.trim();
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let keyword = tokens.first().map(|t| t.to_ascii_lowercase()).unwrap_or_default();

    match (keyword.as_str(), tokens.get(1..).unwrap_or_default()) {
        ("act", []) => Ok(Intent::Act),
        ("rest", []) => Ok(Intent::Rest),
        ("travel", [location]) => Ok(Intent::Travel {
            location: LocationId::parse(location)
                .ok_or_else(|| format!("'{location}' is not a location id"))?,
        }),
        ("use", [item]) => Ok(Intent::Use {
            item: item_id(item)?,
        }),
        ("take", [item]) => Ok(Intent::Take {
            item: item_id(item)?,
            quantity: 1,
        }),
        ("take", [item, n]) => Ok(Intent::Take {
            item: item_id(item)?,
            quantity: positive(n)?,
        }),
        ("give", [item, to, character]) if to.eq_ignore_ascii_case("to") => Ok(Intent::Give {
            item: item_id(item)?,
            quantity: 1,
            character: character_id(character)?,
        }),
        ("give", [item, n, to, character]) if to.eq_ignore_ascii_case("to") => Ok(Intent::Give {
            item: item_id(item)?,
            quantity: positive(n)?,
            character: character_id(character)?,
        }),
        ("spend", [stat, n]) => Ok(Intent::Spend {
            stat: stat_name(stat)?,
            amount: i64::from(positive(n)?),
        }),
        ("gain", [stat, n]) => Ok(Intent::Gain {
            stat: stat_name(stat)?,
            amount: i64::from(positive(n)?),
        }),
        ("talk", [character]) => Ok(Intent::Talk {
            character: character_id(character)?,
            topic: None,
        }),
        ("talk", [character, about, topic @ ..])
            if about.eq_ignore_ascii_case("about") && !topic.is_empty() =>
        {
            Ok(Intent::Talk {
                character: character_id(character)?,
                topic: Some(topic.join(" ")),
            })
        }
        ("", _) => Err("empty intent tag".to_string()),
        _ => Err(format!("cannot read intent '{raw}'")),
    }
}

fn item_id(token: &str) -> Result<ItemId, String> {
    ItemId::parse(token).ok_or_else(|| format!("'{token}' is not an item id"))
}

fn character_id(token: &str) -> Result<CharacterId, String> {
    CharacterId::parse(token).ok_or_else(|| format!("'{token}' is not a character id"))
}

fn stat_name(token: &str) -> Result<String, String> {
    if crate::world::is_valid_slug(token) {
        Ok(token.to_string())
    } else {
        Err(format!("'{token}' is not a stat name"))
    }
}

fn positive(token: &str) -> Result<u32, String> {
    match token.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("'{token}' is not a positive number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::new_adventure;

    fn decode_ok(raw: &str) -> Turn {
        decode(raw, &new_adventure("Ada")).unwrap()
    }

    fn reason(raw: &str) -> ParseFailureReason {
        decode(raw, &new_adventure("Ada")).unwrap_err().reason
    }

    const GOOD: &str = "\
[SCENE]
Rain hammers the roof of the inn.

Mira slides a key across the bar.
[CHOICES]
1. Take the key {intent: take silver_key}
2. Pay for a room {requires: gold >= 5} {intent: spend gold 5}
3. Ask Mira about the mill {intent: talk mira about the old mill}
4. Wait
[MODE]
normal
";

    #[test]
    fn test_decode_full_turn() {
        let turn = decode_ok(GOOD);
        assert_eq!(
            turn.scene,
            "Rain hammers the roof of the inn.\n\nMira slides a key across the bar."
        );
        assert_eq!(turn.choices.len(), 4);
        assert_eq!(turn.directive, ModeDirective::Normal);

        assert_eq!(
            turn.choices[0].intent,
            Intent::Take {
                item: ItemId::new("silver_key"),
                quantity: 1
            }
        );
        assert_eq!(
            turn.choices[1].requirements,
            vec![Requirement::StatAtLeast {
                stat: "gold".into(),
                amount: 5
            }]
        );
        assert_eq!(
            turn.choices[2].intent,
            Intent::Talk {
                character: CharacterId::new("mira"),
                topic: Some("the old mill".into())
            }
        );
        assert_eq!(turn.choices[3], Choice::new("Wait"));
    }

    #[test]
    fn test_decode_is_deterministic() {
        assert_eq!(decode_ok(GOOD), decode_ok(GOOD));
    }

    #[test]
    fn test_encode_decodes_to_same_turn() {
        let turn = decode_ok(GOOD);
        assert_eq!(decode_ok(&turn.encode()), turn);
    }

    #[test]
    fn test_sections_in_any_order_and_case() {
        let raw = "[mode]\ndialogue mira\n[Choices]\n1. Say goodbye\n[scene]\nMira leans closer.";
        let turn = decode_ok(raw);
        assert_eq!(turn.directive, ModeDirective::Dialogue(CharacterId::new("mira")));
        assert_eq!(turn.scene, "Mira leans closer.");
    }

    #[test]
    fn test_missing_mode_directive() {
        let raw = "[SCENE]\nA road.\n[CHOICES]\n1. Walk";
        assert_eq!(reason(raw), ParseFailureReason::MissingModeDirective);
        assert_eq!(reason(raw).code(), "missing_mode_directive");

        let empty = "[SCENE]\nA road.\n[CHOICES]\n1. Walk\n[MODE]\n   \n";
        assert_eq!(reason(empty), ParseFailureReason::MissingModeDirective);
    }

    #[test]
    fn test_missing_sections() {
        assert_eq!(reason(""), ParseFailureReason::MissingScene);
        assert_eq!(reason("[SCENE]\nA road.\n[MODE]\nnormal"), ParseFailureReason::MissingChoices);
        assert_eq!(reason("[SCENE]\n\n[CHOICES]\n1. Go\n[MODE]\nnormal"), ParseFailureReason::EmptyScene);
        assert_eq!(reason("[SCENE]\nA road.\n[CHOICES]\n\n[MODE]\nnormal"), ParseFailureReason::NoChoices);
    }

    #[test]
    fn test_stray_and_unknown_and_duplicate() {
        assert_eq!(
            reason("Sure! Here is the scene:\n[SCENE]\nA road.\n[CHOICES]\n1. Go\n[MODE]\nnormal"),
            ParseFailureReason::StrayContent
        );
        assert_eq!(
            reason("[SCENE]\nA road.\n[NOTES]\nhi\n[CHOICES]\n1. Go\n[MODE]\nnormal"),
            ParseFailureReason::UnknownSection("NOTES".into())
        );
        assert_eq!(
            reason("[SCENE]\nA.\n[SCENE]\nB.\n[CHOICES]\n1. Go\n[MODE]\nnormal"),
            ParseFailureReason::DuplicateSection(Section::Scene)
        );
    }

    #[test]
    fn test_bracketed_narration_is_not_a_header() {
        let turn = decode_ok("[SCENE]\n[Thunder rolls]\nA road.\n[CHOICES]\n1. Go\n[MODE]\nnormal");
        assert!(turn.scene.starts_with("[Thunder rolls]"));
    }

    #[test]
    fn test_malformed_choices() {
        let cases = [
            "1 Go",
            "2. Go",
            "Go north",
            "1. {intent: act}",
            "1. Go {intent: fly north}",
            "1. Go {mood: happy}",
            "1. Go {intent: act} {intent: rest}",
            "1. Go {requires: gold > 5}",
            "1. Go {requires: gold >= 0}",
            "1. Go {requires: Gold >= 2}",
            "1. Go {intent: take rope 0}",
            "1. Go {intent act}",
            "1. Go { north",
            "1. Go } north",
            "1. Go {intent: act} now",
        ];
        for line in cases {
            let raw = format!("[SCENE]\nA road.\n[CHOICES]\n{line}\n[MODE]\nnormal");
            let failure = decode(&raw, &new_adventure("Ada")).unwrap_err();
            assert_eq!(failure.code(), "malformed_choice", "line {line:?} gave {failure:?}");
            assert_eq!(failure.line, Some(4));
        }
    }

    #[test]
    fn test_requirement_forms() {
        let raw = "[SCENE]\nA.\n[CHOICES]\n1. Climb {requires: item rope, strength>=2, item torch >= 1}\n[MODE]\nnormal";
        let turn = decode_ok(raw);
        assert_eq!(
            turn.choices[0].requirements,
            vec![
                Requirement::ItemAtLeast {
                    item: ItemId::new("rope"),
                    quantity: 1
                },
                Requirement::StatAtLeast {
                    stat: "strength".into(),
                    amount: 2
                },
                Requirement::ItemAtLeast {
                    item: ItemId::new("torch"),
                    quantity: 1
                },
            ]
        );
    }

    #[test]
    fn test_intent_forms() {
        let cases = [
            ("act", Intent::Act),
            ("rest", Intent::Rest),
            (
                "travel forest_edge",
                Intent::Travel {
                    location: LocationId::new("forest_edge"),
                },
            ),
            (
                "use healing_potion",
                Intent::Use {
                    item: ItemId::new("healing_potion"),
                },
            ),
            (
                "take rope 2",
                Intent::Take {
                    item: ItemId::new("rope"),
                    quantity: 2,
                },
            ),
            (
                "give torch to bram",
                Intent::Give {
                    item: ItemId::new("torch"),
                    quantity: 1,
                    character: CharacterId::new("bram"),
                },
            ),
            (
                "give travel_rations 2 to bram",
                Intent::Give {
                    item: ItemId::new("travel_rations"),
                    quantity: 2,
                    character: CharacterId::new("bram"),
                },
            ),
            (
                "GAIN wisdom 1",
                Intent::Gain {
                    stat: "wisdom".into(),
                    amount: 1,
                },
            ),
            (
                "talk tomas",
                Intent::Talk {
                    character: CharacterId::new("tomas"),
                    topic: None,
                },
            ),
        ];
        for (wire, expected) in cases {
            let raw = format!("[SCENE]\nA.\n[CHOICES]\n1. Do it {{intent: {wire}}}\n[MODE]\nnormal");
            assert_eq!(decode_ok(&raw).choices[0].intent, expected, "intent {wire:?}");
        }
    }

    #[test]
    fn test_unknown_entities() {
        let cases = [
            ("1. Grab it {intent: take golden_crown}", EntityRef::Item(ItemId::new("golden_crown"))),
            ("1. Flex {requires: luck >= 2}", EntityRef::Stat("luck".into())),
            (
                "1. Sail {intent: travel atlantis}",
                EntityRef::Location(LocationId::new("atlantis")),
            ),
            (
                "1. Chat {intent: talk merlin}",
                EntityRef::Character(CharacterId::new("merlin")),
            ),
        ];
        for (line, entity) in cases {
            let raw = format!("[SCENE]\nA.\n[CHOICES]\n{line}\n[MODE]\nnormal");
            assert_eq!(reason(&raw), ParseFailureReason::UnknownEntity(entity));
        }

        let raw = "[SCENE]\nA.\n[CHOICES]\n1. Go\n[MODE]\ndialogue merlin";
        assert_eq!(
            reason(raw),
            ParseFailureReason::UnknownEntity(EntityRef::Character(CharacterId::new("merlin")))
        );
    }

    #[test]
    fn test_mode_errors() {
        let base = "[SCENE]\nA.\n[CHOICES]\n1. Go\n[MODE]\n";
        assert_eq!(reason(&format!("{base}combat")), ParseFailureReason::UnknownMode("combat".into()));
        assert_eq!(reason(&format!("{base}normal mira")).code(), "mode_mismatch");
        assert_eq!(reason(&format!("{base}dialogue")).code(), "mode_mismatch");
        assert_eq!(reason(&format!("{base}dialogue mira bram")).code(), "mode_mismatch");
        assert_eq!(reason(&format!("{base}dialogue Mira")).code(), "mode_mismatch");
        assert_eq!(reason(&format!("{base}normal\nnormal")).code(), "mode_mismatch");
    }

    #[test]
    fn test_crlf_and_trailing_whitespace() {
        let raw = "[SCENE]  \r\nA road.  \r\n[CHOICES]\r\n1. Walk  \r\n[MODE]\r\nnormal\r\n";
        let turn = decode_ok(raw);
        assert_eq!(turn.scene, "A road.");
        assert_eq!(turn.choices[0].label, "Walk");
    }

    #[test]
    fn test_failure_display() {
        let failure = decode("[SCENE]\nA.\n[CHOICES]\n1. Go\n[MODE]\nflying", &new_adventure("Ada"))
            .unwrap_err();
        assert_eq!(failure.to_string(), "unknown mode 'flying'");
        assert_eq!(failure.line, Some(6));
    }
}
