//! Training labels and the retraining state machine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label attached to a [`crate::TrainingExample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// Judged but never decided
    Untrained,
    /// Confirmed spam
    Spam,
    /// Confirmed ham
    Ham,
    /// Tentative spam, pending confirmation
    MaybeSpam,
    /// Tentative ham, pending confirmation
    MaybeHam,
}

/// Coarse grouping used by the retraining rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelFamily {
    Untrained,
    Spam,
    Ham,
}

/// The two classes the Bayesian model is trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingClass {
    Spam,
    Ham,
}

impl Label {
    /// Only decisive labels feed the model.
    pub fn is_trainable(self) -> bool {
        matches!(self, Self::Spam | Self::Ham)
    }

    pub fn family(self) -> LabelFamily {
        match self {
            Self::Untrained => LabelFamily::Untrained,
            Self::Spam | Self::MaybeSpam => LabelFamily::Spam,
            Self::Ham | Self::MaybeHam => LabelFamily::Ham,
        }
    }

    /// Class this label trains, if any
    pub fn training_class(self) -> Option<TrainingClass> {
        match self {
            Self::Spam => Some(TrainingClass::Spam),
            Self::Ham => Some(TrainingClass::Ham),
            Self::Untrained | Self::MaybeSpam | Self::MaybeHam => None,
        }
    }

    /// Whether moving an example from `from` to `to` must enqueue retraining.
    ///
    /// Moves inside one family (`spam`/`maybe_spam`, `ham`/`maybe_ham`) never
    /// retrain. Any family change retrains when a decisive label is involved on
    /// either side, which covers `untrained` <-> decisive and the
    /// `spam` <-> `ham` flip performed by unbans.
    pub fn requires_retrain(from: Label, to: Label) -> bool {
        if from.family() == to.family() {
            return false;
        }
        from.is_trainable() || to.is_trainable()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Untrained => "untrained",
            Self::Spam => "spam",
            Self::Ham => "ham",
            Self::MaybeSpam => "maybe_spam",
            Self::MaybeHam => "maybe_ham",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "untrained" => Ok(Self::Untrained),
            "spam" => Ok(Self::Spam),
            "ham" => Ok(Self::Ham),
            "maybe_spam" => Ok(Self::MaybeSpam),
            "maybe_ham" => Ok(Self::MaybeHam),
            other => Err(crate::Error::config(format!("unknown label: {}", other))),
        }
    }
}

/// Who or what set an example's label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Created by the detection pipeline, not yet reviewed
    #[default]
    NotMarkedYet,
    /// Decided automatically (rule, memo precedent, fingerprint sync)
    AutoSync,
    /// A group moderator in the chat
    GroupAdmin,
    /// An operator through the admin interface
    AdminDashboard,
    /// Loaded from a labelled dataset
    BootstrapImport,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Label; 5] = [
        Label::Untrained,
        Label::Spam,
        Label::Ham,
        Label::MaybeSpam,
        Label::MaybeHam,
    ];

    #[test]
    fn test_trainable_boundary_crossings_retrain() {
        assert!(Label::requires_retrain(Label::Untrained, Label::Spam));
        assert!(Label::requires_retrain(Label::Untrained, Label::Ham));
        assert!(Label::requires_retrain(Label::Spam, Label::Untrained));
        assert!(Label::requires_retrain(Label::Ham, Label::Untrained));
    }

    #[test]
    fn test_within_family_moves_do_not_retrain() {
        assert!(!Label::requires_retrain(Label::Spam, Label::MaybeSpam));
        assert!(!Label::requires_retrain(Label::MaybeSpam, Label::Spam));
        assert!(!Label::requires_retrain(Label::Ham, Label::MaybeHam));
        assert!(!Label::requires_retrain(Label::MaybeHam, Label::Ham));
        assert!(!Label::requires_retrain(Label::Untrained, Label::MaybeSpam));
        assert!(!Label::requires_retrain(Label::MaybeSpam, Label::MaybeHam));
    }

    #[test]
    fn test_class_flip_always_retrains() {
        assert!(Label::requires_retrain(Label::Spam, Label::Ham));
        assert!(Label::requires_retrain(Label::Ham, Label::Spam));
        assert!(Label::requires_retrain(Label::MaybeSpam, Label::Ham));
    }

    #[test]
    fn test_identity_never_retrains() {
        for label in ALL {
            assert!(!Label::requires_retrain(label, label));
        }
    }

    #[test]
    fn test_label_string_forms() {
        for label in ALL {
            assert_eq!(label.as_str().parse::<Label>().unwrap(), label);
            let json = serde_json::to_string(&label).unwrap();
            assert_eq!(json, format!("\"{}\"", label));
        }
        assert!("spammy".parse::<Label>().is_err());
    }
}
