//! Pure preference tree updates.
//!
//! Each function takes the current tree and returns either `Unchanged` or a
//! new tree together with the payload to sync. The input tree is never
//! modified; observers holding a snapshot keep seeing the old values.

use super::model::{
    Category, CategoryPayload, ChannelLevelPreference, ChannelPayload, ChannelPreference,
    PreferenceData, PreferenceOption,
};
use crate::error::{Result, SuprSendError};

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<P> {
    Unchanged,
    Updated { tree: PreferenceData, payload: P },
}

/// Position of the first category with key `category`.
fn locate(tree: &PreferenceData, category: &str) -> Result<Option<(usize, usize)>> {
    let sections = tree
        .sections
        .as_ref()
        .ok_or_else(|| SuprSendError::validation("Sections doesn't exist"))?;

    for (section_index, section) in sections.iter().enumerate() {
        let Some(subcategories) = &section.subcategories else {
            continue;
        };
        if let Some(index) = subcategories.iter().position(|c| c.category == category) {
            return Ok(Some((section_index, index)));
        }
    }
    Ok(None)
}

fn with_category(tree: &PreferenceData, at: (usize, usize), updated: Category) -> PreferenceData {
    let mut next = tree.clone();
    if let Some(slot) = next
        .sections
        .as_mut()
        .and_then(|sections| sections.get_mut(at.0))
        .and_then(|section| section.subcategories.as_mut())
        .and_then(|subcategories| subcategories.get_mut(at.1))
    {
        *slot = updated;
    }
    next
}

fn category_at(tree: &PreferenceData, at: (usize, usize)) -> Option<&Category> {
    tree.sections
        .as_ref()?
        .get(at.0)?
        .subcategories
        .as_ref()?
        .get(at.1)
}

pub fn update_category(
    tree: &PreferenceData,
    category: &str,
    preference: PreferenceOption,
    show_opt_out_channels: bool,
) -> Result<Mutation<CategoryPayload>> {
    let at = locate(tree, category)?
        .ok_or_else(|| SuprSendError::validation("Category not found"))?;
    let current = category_at(tree, at)
        .ok_or_else(|| SuprSendError::validation("Category not found"))?;

    if !current.is_editable {
        return Err(SuprSendError::validation(
            "Category preference is not editable",
        ));
    }
    if current.preference == preference {
        return Ok(Mutation::Unchanged);
    }

    let mut updated = current.clone();
    updated.preference = preference;

    let opt_out_channels = if show_opt_out_channels && preference == PreferenceOption::OptIn {
        None
    } else {
        Some(updated.opt_out_channels())
    };

    Ok(Mutation::Updated {
        tree: with_category(tree, at, updated),
        payload: CategoryPayload {
            preference,
            opt_out_channels,
        },
    })
}

/// Opting a channel in also opts its category in.
pub fn update_channel_in_category(
    tree: &PreferenceData,
    channel: &str,
    preference: PreferenceOption,
    category: &str,
) -> Result<Mutation<CategoryPayload>> {
    let at = locate(tree, category)?
        .ok_or_else(|| SuprSendError::validation("Category not found"))?;
    let current = category_at(tree, at)
        .ok_or_else(|| SuprSendError::validation("Category not found"))?;

    let channel_index = current
        .channels
        .as_ref()
        .and_then(|channels| channels.iter().position(|c| c.channel == channel))
        .ok_or_else(|| SuprSendError::validation("Category's channel not found"))?;

    let mut updated = current.clone();
    let Some(target) = updated
        .channels
        .as_mut()
        .and_then(|channels| channels.get_mut(channel_index))
    else {
        return Err(SuprSendError::validation("Category's channel not found"));
    };

    if !target.is_editable {
        return Err(SuprSendError::validation(
            "Channel preference is not editable",
        ));
    }
    if target.preference == preference {
        return Ok(Mutation::Unchanged);
    }

    target.preference = preference;
    if preference == PreferenceOption::OptIn {
        updated.preference = PreferenceOption::OptIn;
    }

    let payload = CategoryPayload {
        preference: updated.preference,
        opt_out_channels: Some(updated.opt_out_channels()),
    };

    Ok(Mutation::Updated {
        tree: with_category(tree, at, updated),
        payload,
    })
}

pub fn update_overall_channel(
    tree: &PreferenceData,
    channel: &str,
    preference: ChannelLevelPreference,
) -> Result<Mutation<ChannelPayload>> {
    let channel_preferences = tree
        .channel_preferences
        .as_ref()
        .ok_or_else(|| SuprSendError::validation("Channel preferences does not exist."))?;

    let index = channel_preferences
        .iter()
        .position(|c| c.channel == channel)
        .ok_or_else(|| SuprSendError::validation("Channel data not found."))?;

    let restricted = preference.is_restricted();
    if channel_preferences[index].is_restricted == restricted {
        return Ok(Mutation::Unchanged);
    }

    let updated = ChannelPreference {
        channel: channel.to_string(),
        is_restricted: restricted,
    };
    let mut next = tree.clone();
    if let Some(slot) = next
        .channel_preferences
        .as_mut()
        .and_then(|prefs| prefs.get_mut(index))
    {
        *slot = updated.clone();
    }

    Ok(Mutation::Updated {
        tree: next,
        payload: ChannelPayload {
            channel_preferences: vec![updated],
        },
    })
}

/// `current` with the category `category` taken from `previous`.
pub fn restore_category(
    current: &PreferenceData,
    previous: &PreferenceData,
    category: &str,
) -> PreferenceData {
    let (Ok(Some(at)), Some(original)) =
        (locate(current, category), previous.find_category(category))
    else {
        return current.clone();
    };
    with_category(current, at, original.clone())
}

/// `current` with the channel-level entry for `channel` taken from `previous`.
pub fn restore_channel(
    current: &PreferenceData,
    previous: &PreferenceData,
    channel: &str,
) -> PreferenceData {
    let Some(original) = previous.find_channel_preference(channel) else {
        return current.clone();
    };
    let mut next = current.clone();
    if let Some(slot) = next
        .channel_preferences
        .as_mut()
        .and_then(|prefs| prefs.iter_mut().find(|c| c.channel == channel))
    {
        *slot = original.clone();
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> PreferenceData {
        serde_json::from_value(json!({
            "sections": [
                {
                    "name": "Account",
                    "subcategories": [
                        {
                            "name": "Security",
                            "category": "security",
                            "preference": "opt_in",
                            "is_editable": false,
                            "channels": []
                        }
                    ]
                },
                {
                    "name": "Product",
                    "subcategories": [
                        {
                            "name": "Newsletter",
                            "category": "newsletter",
                            "preference": "opt_out",
                            "is_editable": true,
                            "channels": [
                                {"channel": "email", "preference": "opt_out", "is_editable": true},
                                {"channel": "sms", "preference": "opt_out", "is_editable": false}
                            ]
                        },
                        {
                            "name": "Newsletter duplicate",
                            "category": "newsletter",
                            "preference": "opt_out",
                            "is_editable": true,
                            "channels": []
                        }
                    ]
                }
            ],
            "channel_preferences": [
                {"channel": "email", "is_restricted": false},
                {"channel": "sms", "is_restricted": true}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_update_category_first_match_only() {
        let original = tree();
        let Mutation::Updated { tree: next, payload } =
            update_category(&original, "newsletter", PreferenceOption::OptIn, true).unwrap()
        else {
            panic!("expected update");
        };

        let subcategories = next.sections.as_ref().unwrap()[1]
            .subcategories
            .as_ref()
            .unwrap();
        assert_eq!(subcategories[0].preference, PreferenceOption::OptIn);
        assert_eq!(subcategories[1].preference, PreferenceOption::OptOut);
        assert_eq!(payload.preference, PreferenceOption::OptIn);
        assert_eq!(payload.opt_out_channels, None);

        // input untouched
        assert_eq!(
            original.find_category("newsletter").unwrap().preference,
            PreferenceOption::OptOut
        );
    }

    #[test]
    fn test_update_category_opt_out_lists_channels() {
        let mut original = tree();
        original = match update_category(&original, "newsletter", PreferenceOption::OptIn, true)
            .unwrap()
        {
            Mutation::Updated { tree, .. } => tree,
            Mutation::Unchanged => original,
        };

        let Mutation::Updated { payload, .. } =
            update_category(&original, "newsletter", PreferenceOption::OptOut, true).unwrap()
        else {
            panic!("expected update");
        };
        assert_eq!(
            payload.opt_out_channels,
            Some(vec!["email".to_string(), "sms".to_string()])
        );
    }

    #[test]
    fn test_update_category_same_value_is_unchanged() {
        let result =
            update_category(&tree(), "newsletter", PreferenceOption::OptOut, true).unwrap();
        assert_eq!(result, Mutation::Unchanged);
    }

    #[test]
    fn test_update_category_errors() {
        let err = update_category(&tree(), "missing", PreferenceOption::OptIn, true).unwrap_err();
        assert_eq!(err.message, "Category not found");

        let err = update_category(&tree(), "security", PreferenceOption::OptOut, true).unwrap_err();
        assert_eq!(err.message, "Category preference is not editable");

        let err = update_category(
            &PreferenceData::default(),
            "security",
            PreferenceOption::OptOut,
            true,
        )
        .unwrap_err();
        assert_eq!(err.message, "Sections doesn't exist");
    }

    #[test]
    fn test_channel_opt_in_cascades_to_category() {
        let Mutation::Updated { tree: next, payload } = update_channel_in_category(
            &tree(),
            "email",
            PreferenceOption::OptIn,
            "newsletter",
        )
        .unwrap() else {
            panic!("expected update");
        };

        let category = next.find_category("newsletter").unwrap();
        assert_eq!(category.preference, PreferenceOption::OptIn);
        assert_eq!(payload.preference, PreferenceOption::OptIn);
        assert_eq!(payload.opt_out_channels, Some(vec!["sms".to_string()]));
    }

    #[test]
    fn test_channel_errors() {
        let err = update_channel_in_category(&tree(), "push", PreferenceOption::OptIn, "newsletter")
            .unwrap_err();
        assert_eq!(err.message, "Category's channel not found");

        let err = update_channel_in_category(&tree(), "sms", PreferenceOption::OptIn, "newsletter")
            .unwrap_err();
        assert_eq!(err.message, "Channel preference is not editable");
    }

    #[test]
    fn test_overall_channel() {
        let Mutation::Updated { tree: next, payload } =
            update_overall_channel(&tree(), "email", ChannelLevelPreference::Required).unwrap()
        else {
            panic!("expected update");
        };
        assert!(next.find_channel_preference("email").unwrap().is_restricted);
        assert_eq!(payload.channel_preferences.len(), 1);

        let unchanged =
            update_overall_channel(&tree(), "sms", ChannelLevelPreference::Required).unwrap();
        assert_eq!(unchanged, Mutation::Unchanged);

        let err = update_overall_channel(&tree(), "slack", ChannelLevelPreference::All).unwrap_err();
        assert_eq!(err.message, "Channel data not found.");
    }

    #[test]
    fn test_restore_category() {
        let previous = tree();
        let Mutation::Updated { tree: current, .. } =
            update_category(&previous, "newsletter", PreferenceOption::OptIn, true).unwrap()
        else {
            panic!("expected update");
        };

        let restored = restore_category(&current, &previous, "newsletter");
        assert_eq!(restored, previous);
    }

    #[test]
    fn test_restore_channel() {
        let previous = tree();
        let Mutation::Updated { tree: current, .. } =
            update_overall_channel(&previous, "email", ChannelLevelPreference::Required).unwrap()
        else {
            panic!("expected update");
        };

        assert_eq!(restore_channel(&current, &previous, "email"), previous);
    }
}
