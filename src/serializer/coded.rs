//! Enumerations with external codes
//!
//! Fiscal layouts encode enumerations as short codes (`"1"`, `"10"`, `"SN"`).
//! A [`CodeTable`] is the static list of members of one enumeration with
//! their optional codes; [`CodedEnum`] links a Rust enum to its table.

use crate::error::{Error, Result};
use std::fmt;

/// One member of a coded enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodedMember {
    /// Member name
    pub name: &'static str,
    /// External code, when the layout declares one
    pub code: Option<&'static str>,
}

impl CodedMember {
    /// Text written to the document: the code, or the name when there is none
    pub fn as_text(&self) -> &'static str {
        self.code.unwrap_or(self.name)
    }
}

impl fmt::Display for CodedMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Static table of the members of a coded enumeration
#[derive(Debug, PartialEq, Eq)]
pub struct CodeTable {
    /// Enumeration name
    pub name: &'static str,
    /// Members in declaration order
    pub members: &'static [CodedMember],
}

impl CodeTable {
    /// First member declaring `code`
    pub fn by_code(&self, code: &str) -> Option<CodedMember> {
        self.members
            .iter()
            .find(|m| m.code == Some(code))
            .copied()
    }

    /// Member called `name`
    pub fn by_name(&self, name: &str) -> Option<CodedMember> {
        self.members.iter().find(|m| m.name == name).copied()
    }

    /// Resolve document text: code first, member name as fallback
    pub fn resolve(&self, text: &str) -> Option<CodedMember> {
        self.by_code(text).or_else(|| self.by_name(text))
    }

    /// Whether `member` belongs to this table
    pub fn contains(&self, member: &CodedMember) -> bool {
        self.members.contains(member)
    }
}

/// A Rust enum backed by a [`CodeTable`]
pub trait CodedEnum: Sized + Copy {
    /// Static table of the enumeration
    const TABLE: &'static CodeTable;

    /// Table entry of this variant
    fn member(self) -> CodedMember;

    /// Variant for a table entry
    fn from_member(member: &CodedMember) -> Option<Self>;

    /// External code (or name) of this variant
    fn code(self) -> &'static str {
        self.member().as_text()
    }

    /// Parse document text into a variant
    fn from_code(text: &str) -> Result<Self> {
        Self::TABLE
            .resolve(text)
            .and_then(|m| Self::from_member(&m))
            .ok_or_else(|| {
                Error::format(
                    Self::TABLE.name,
                    format!("'{}' is not a member of {}", text, Self::TABLE.name),
                )
            })
    }
}

/// Declare an enum with external codes and implement [`CodedEnum`] for it
///
/// ```rust,ignore
/// coded_enum! {
///     /// Tipo de ambiente
///     pub enum TipoAmbiente {
///         Producao = "1",
///         Homologacao = "2",
///     }
/// }
/// ```
///
/// A variant declared without `= "code"` is written with its own name.
#[macro_export]
macro_rules! coded_enum {
    (@code $code:literal) => { Some($code) };
    (@code) => { None };
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident $(= $code:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )*
        }

        impl $name {
            const MEMBERS: &'static [$crate::serializer::CodedMember] = &[
                $(
                    $crate::serializer::CodedMember {
                        name: stringify!($variant),
                        code: $crate::coded_enum!(@code $($code)?),
                    },
                )*
            ];

            /// Every variant in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),*];
        }

        impl $crate::serializer::CodedEnum for $name {
            const TABLE: &'static $crate::serializer::CodeTable = &$crate::serializer::CodeTable {
                name: stringify!($name),
                members: $name::MEMBERS,
            };

            fn member(self) -> $crate::serializer::CodedMember {
                $name::MEMBERS[self as usize]
            }

            fn from_member(member: &$crate::serializer::CodedMember) -> Option<Self> {
                match member.name {
                    $(stringify!($variant) => Some($name::$variant),)*
                    _ => None,
                }
            }
        }

        impl From<$name> for $crate::serializer::FieldValue {
            fn from(value: $name) -> Self {
                $crate::serializer::FieldValue::Coded(
                    <$name as $crate::serializer::CodedEnum>::member(value),
                )
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::coded_enum! {
        /// Test enumeration
        enum Modalidade {
            Margem = "0",
            Pauta = "1",
            Livre,
            Repetido = "1",
        }
    }

    #[test]
    fn test_code_or_name() {
        assert_eq!(Modalidade::Margem.code(), "0");
        assert_eq!(Modalidade::Livre.code(), "Livre");
    }

    #[test]
    fn test_reverse_lookup_first_member_wins() {
        assert_eq!(Modalidade::from_code("1").unwrap(), Modalidade::Pauta);
        assert_eq!(Modalidade::from_code("Repetido").unwrap(), Modalidade::Repetido);
    }

    #[test]
    fn test_unknown_code() {
        let err = Modalidade::from_code("9").unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_table() {
        let table = Modalidade::TABLE;
        assert_eq!(table.name, "Modalidade");
        assert_eq!(table.members.len(), 4);
        assert_eq!(Modalidade::ALL.len(), 4);
        assert!(table.contains(&Modalidade::Livre.member()));
        assert_eq!(table.resolve("0").map(|m| m.name), Some("Margem"));
        assert_eq!(table.resolve("x"), None);
    }
}
