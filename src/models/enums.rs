use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

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

str_enum!(ExerciseCategory {
    Strength => "strength",
    Flexibility => "flexibility",
    Mobility => "mobility",
    Balance => "balance",
    Cardio => "cardio",
});

str_enum!(Difficulty {
    Beginner => "beginner",
    Intermediate => "intermediate",
    Advanced => "advanced",
});

// Stored lifecycle state. `Overdue` is never stored, see `EffectiveStatus`.
str_enum!(AssignmentStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
});

str_enum!(EffectiveStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Overdue => "overdue",
});

impl From<AssignmentStatus> for EffectiveStatus {
    fn from(status: AssignmentStatus) -> Self {
        match status {
            AssignmentStatus::Pending => Self::Pending,
            AssignmentStatus::InProgress => Self::InProgress,
            AssignmentStatus::Completed => Self::Completed,
        }
    }
}
