use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferenceOption {
    #[serde(rename = "opt_in")]
    OptIn,
    #[serde(rename = "opt_out")]
    OptOut,
}

/// Channel-level setting: receive everything, or only required categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLevelPreference {
    All,
    Required,
}

impl ChannelLevelPreference {
    pub fn is_restricted(&self) -> bool {
        matches!(self, ChannelLevelPreference::Required)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryChannel {
    pub channel: String,
    pub preference: PreferenceOption,
    #[serde(default)]
    pub is_editable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub name: String,
    /// Category key used in URLs.
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub preference: PreferenceOption,
    #[serde(default)]
    pub is_editable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<CategoryChannel>>,
}

impl Category {
    /// Channels currently opted out, in tree order.
    pub fn opt_out_channels(&self) -> Vec<String> {
        self.channels
            .iter()
            .flatten()
            .filter(|c| c.preference == PreferenceOption::OptOut)
            .map(|c| c.channel.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategories: Option<Vec<Category>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPreference {
    pub channel: String,
    pub is_restricted: bool,
}

/// The full preference tree of a subscriber.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<Section>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_preferences: Option<Vec<ChannelPreference>>,
}

impl PreferenceData {
    /// First category with key `category`, searching sections in order.
    pub fn find_category(&self, category: &str) -> Option<&Category> {
        self.sections
            .iter()
            .flatten()
            .filter_map(|section| section.subcategories.as_ref())
            .flatten()
            .find(|c| c.category == category)
    }

    pub fn find_channel_preference(&self, channel: &str) -> Option<&ChannelPreference> {
        self.channel_preferences
            .iter()
            .flatten()
            .find(|c| c.channel == channel)
    }
}

/// Body of `PATCH .../category/{category}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryPayload {
    pub preference: PreferenceOption,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opt_out_channels: Option<Vec<String>>,
}

/// Body of `PATCH .../channel_preference`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelPayload {
    pub channel_preferences: Vec<ChannelPreference>,
}
