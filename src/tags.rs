//! Closed sets of tags attached to sessions and venues. The string
//! forms must match the database schema constraints.

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BackendError;

macro_rules! closed_set {
    ($(#[$meta:meta])* $name:ident, $error:ident; $($variant:ident => $label:expr),+ $(,)?) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            fn valid_values() -> String {
                Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
            }
        }

        impl FromStr for $name {
            type Err = BackendError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .find(|v| v.as_str() == s)
                    .copied()
                    .ok_or_else(|| BackendError::$error {
                        value: s.to_owned(),
                        valid: Self::valid_values(),
                    })
            }
        }

        impl TryFrom<String> for $name {
            type Error = BackendError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.as_str().to_owned()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

closed_set! {
    /// A musical genre a session welcomes.
    Genre, InvalidGenre;
    Any => "Any",
    StraightAhead => "Straight-Ahead_Jazz",
    JazzFunk => "Jazz-Funk",
    Fusion => "Fusion",
    LatinJazz => "Latin_Jazz",
    ModernJazz => "Modern_Jazz",
    TradJazz => "Trad_Jazz",
    Funk => "Funk",
    RnB => "RnB",
    HipHop => "Hip-Hop",
    Blues => "Blues",
    Folk => "Folk",
    Rock => "Rock",
    Pop => "Pop",
    WorldMusic => "World_Music",
}

closed_set! {
    /// Equipment a venue provides.
    Backline, InvalidBackline;
    Pa => "PA",
    GuitarAmp => "Guitar_Amp",
    BassAmp => "Bass_Amp",
    Drums => "Drums",
    Keys => "Keys",
    Microphone => "Microphone",
    MiscPercussion => "MiscPercussion",
}

/// Parses a comma-separated list such as `PA,Drums`.
pub fn parse_list<T: FromStr<Err = BackendError>>(s: &str) -> Result<Vec<T>, BackendError> {
    s.split(',').map(str::parse).collect()
}

/// Parses tags read back from the store.
pub fn parse_all<T: FromStr<Err = BackendError>>(
    values: impl IntoIterator<Item = String>,
) -> Result<Vec<T>, BackendError> {
    values.into_iter().map(|v| v.parse()).collect()
}
