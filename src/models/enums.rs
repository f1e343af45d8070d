use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ItemStatus {
    Pending => "pending",
    Transferring => "transferring",
    Persisted => "persisted",
    Failed => "failed",
});

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Persisted | Self::Failed)
    }

    /// Pending → Transferring → {Persisted | Failed}. No skips, no exits.
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Transferring)
                | (Self::Transferring, Self::Persisted)
                | (Self::Transferring, Self::Failed)
        )
    }
}

/// Status written to the metadata registry for records and batch owners.
str_enum!(RecordStatus {
    Pending => "pending",
    Processing => "processing",
});

str_enum!(Stage {
    Convert => "convert",
    Extract => "extract",
    Analyze => "analyze",
    Score => "score",
});

impl Stage {
    pub const COUNT: usize = 4;

    pub fn all() -> &'static [Stage] {
        &[Self::Convert, Self::Extract, Self::Analyze, Self::Score]
    }

    /// Zero-based position in the pipeline.
    pub fn index(&self) -> usize {
        match self {
            Self::Convert => 0,
            Self::Extract => 1,
            Self::Analyze => 2,
            Self::Score => 3,
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Convert => Some(Self::Extract),
            Self::Extract => Some(Self::Analyze),
            Self::Analyze => Some(Self::Score),
            Self::Score => None,
        }
    }
}

str_enum!(RunState {
    Running => "running",
    Succeeded => "succeeded",
    Failed => "failed",
});
