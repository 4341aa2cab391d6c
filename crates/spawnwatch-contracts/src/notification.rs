use serde::{Deserialize, Serialize};

pub const SPAWN_CARD_TITLE: &str = "Wild Pokémon Appeared! ✨";
pub const CATCH_FIELD: &str = "Catch Command";
pub const LOCATION_FIELD: &str = "Server Location";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Structured notification card delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCard {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub fields: Vec<CardField>,
    #[serde(default)]
    pub footer: Option<String>,
    /// Species name the card currently shows, lowercase.
    pub species: String,
}

/// Everything needed to render a spawn card.
#[derive(Debug, Clone)]
pub struct SpawnCardSpec<'a> {
    pub species: &'a str,
    pub scope_name: &'a str,
    pub color: u32,
    pub message_link: &'a str,
    pub thumbnail_url: Option<&'a str>,
    pub upstream_bot_id: u64,
}

impl NotificationCard {
    pub fn spawn(params: &SpawnCardSpec<'_>) -> Self {
        Self {
            title: SPAWN_CARD_TITLE.to_string(),
            description: spotted_description(params.species, params.scope_name),
            color: params.color,
            thumbnail_url: params.thumbnail_url.map(str::to_string),
            fields: vec![
                CardField {
                    name: CATCH_FIELD.to_string(),
                    value: catch_command(params.upstream_bot_id, params.species),
                    inline: false,
                },
                CardField {
                    name: LOCATION_FIELD.to_string(),
                    value: format!("[Click here to go to the message]({})", params.message_link),
                    inline: false,
                },
            ],
            footer: Some(format!("PokéDetector | Guild: {}", params.scope_name)),
            species: params.species.to_string(),
        }
    }

    /// Copy of this card re-targeted at another species. Title, thumbnail,
    /// footer and non-catch fields are preserved.
    pub fn with_species(
        &self,
        species: &str,
        scope_name: &str,
        color: u32,
        upstream_bot_id: u64,
    ) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                if field.name == CATCH_FIELD {
                    CardField {
                        name: CATCH_FIELD.to_string(),
                        value: catch_command(upstream_bot_id, species),
                        inline: false,
                    }
                } else {
                    field.clone()
                }
            })
            .collect();
        Self {
            title: self.title.clone(),
            description: spotted_description(species, scope_name),
            color,
            thumbnail_url: self.thumbnail_url.clone(),
            fields,
            footer: self.footer.clone(),
            species: species.to_string(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&CardField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

pub fn catch_command(upstream_bot_id: u64, species: &str) -> String {
    format!("```<@{upstream_bot_id}> catch {species}```")
}

fn spotted_description(species: &str, scope_name: &str) -> String {
    format!(
        "I spotted a **{}** in **{}**!",
        capitalize(species),
        scope_name
    )
}

/// Uppercases the first character and lowercases the rest.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kanto_pikachu() -> SpawnCardSpec<'static> {
        SpawnCardSpec {
            species: "pikachu",
            scope_name: "Kanto",
            color: 0xF7D02C,
            message_link: "https://discord.com/channels/1/2/3",
            thumbnail_url: Some("https://cdn.example/spawn.png"),
            upstream_bot_id: 716390085896962058,
        }
    }

    #[test]
    fn spawn_card_layout() {
        let card = NotificationCard::spawn(&kanto_pikachu());
        assert_eq!(card.title, SPAWN_CARD_TITLE);
        assert_eq!(card.description, "I spotted a **Pikachu** in **Kanto**!");
        assert_eq!(
            card.field(CATCH_FIELD).map(|field| field.value.as_str()),
            Some("```<@716390085896962058> catch pikachu```")
        );
        assert_eq!(
            card.field(LOCATION_FIELD).map(|field| field.value.as_str()),
            Some("[Click here to go to the message](https://discord.com/channels/1/2/3)")
        );
        assert_eq!(card.footer.as_deref(), Some("PokéDetector | Guild: Kanto"));
        assert_eq!(card.species, "pikachu");
    }

    #[test]
    fn with_species_rewrites_only_species_dependent_parts() {
        let card = NotificationCard::spawn(&kanto_pikachu());
        let edited = card.with_species("raichu", "Kanto", 0x123456, 716390085896962058);

        assert_eq!(edited.title, card.title);
        assert_eq!(edited.thumbnail_url, card.thumbnail_url);
        assert_eq!(edited.footer, card.footer);
        assert_eq!(edited.field(LOCATION_FIELD), card.field(LOCATION_FIELD));
        assert_eq!(edited.description, "I spotted a **Raichu** in **Kanto**!");
        assert_eq!(
            edited.field(CATCH_FIELD).map(|field| field.value.as_str()),
            Some("```<@716390085896962058> catch raichu```")
        );
        assert_eq!(edited.color, 0x123456);
        assert_eq!(edited.species, "raichu");
    }

    #[test]
    fn capitalize_matches_title_case_of_first_letter() {
        assert_eq!(capitalize("mr-mime"), "Mr-mime");
        assert_eq!(capitalize("EEVEE"), "Eevee");
        assert_eq!(capitalize(""), "");
    }
}
