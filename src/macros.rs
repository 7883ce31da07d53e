//! Crate-wide macroses

/// Builds `validator::ValidationErrors` from a field -> [code => message] map.
#[macro_export]
macro_rules! validation_errors {
    ({$($field:tt: [$($code:expr => $value:expr),*]),*}) => {{
        use std::borrow::Cow;
        use std::collections::HashMap;
        use validator::{ValidationError, ValidationErrors};

        let mut errors = ValidationErrors::new();
        $(
            $(
                let error = ValidationError {
                    code: Cow::from($code),
                    message: Some(Cow::from($value)),
                    params: HashMap::new(),
                };

                errors.add($field, error);
            )*
        )*

        errors
    }};
}

/// Integer id newtypes mapped on `Integer` columns.
#[macro_export]
macro_rules! id_newtype {
    ($($name:ident),+ $(,)*) => {$(
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
        #[sql_type = "::diesel::sql_types::Integer"]
        pub struct $name(pub i32);

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(value: i32) -> Self {
                $name(value)
            }
        }

        impl ::diesel::serialize::ToSql<::diesel::sql_types::Integer, ::diesel::pg::Pg> for $name {
            fn to_sql<W: ::std::io::Write>(
                &self,
                out: &mut ::diesel::serialize::Output<W, ::diesel::pg::Pg>,
            ) -> ::diesel::serialize::Result {
                <i32 as ::diesel::serialize::ToSql<::diesel::sql_types::Integer, ::diesel::pg::Pg>>::to_sql(&self.0, out)
            }
        }

        impl ::diesel::deserialize::FromSql<::diesel::sql_types::Integer, ::diesel::pg::Pg> for $name {
            fn from_sql(bytes: Option<&[u8]>) -> ::diesel::deserialize::Result<Self> {
                <i32 as ::diesel::deserialize::FromSql<::diesel::sql_types::Integer, ::diesel::pg::Pg>>::from_sql(bytes).map($name)
            }
        }
    )+};
}

/// Enums stored as their lowercase names in `VarChar` columns.
#[macro_export]
macro_rules! varchar_enum {
    ($(#[$meta:meta])* pub enum $name:ident { $($variant:ident => $value:tt),+ $(,)* }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
        $(#[$meta])*
        #[sql_type = "::diesel::sql_types::VarChar"]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match *self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::failure::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err(format_err!("Unrecognized enum variant for {}: {}", stringify!($name), other)),
                }
            }
        }

        impl ::diesel::serialize::ToSql<::diesel::sql_types::VarChar, ::diesel::pg::Pg> for $name {
            fn to_sql<W: ::std::io::Write>(
                &self,
                out: &mut ::diesel::serialize::Output<W, ::diesel::pg::Pg>,
            ) -> ::diesel::serialize::Result {
                ::std::io::Write::write_all(out, self.as_str().as_bytes())?;
                Ok(::diesel::serialize::IsNull::No)
            }
        }

        impl ::diesel::deserialize::FromSql<::diesel::sql_types::VarChar, ::diesel::pg::Pg> for $name {
            fn from_sql(bytes: Option<&[u8]>) -> ::diesel::deserialize::Result<Self> {
                let value = <String as ::diesel::deserialize::FromSql<::diesel::sql_types::VarChar, ::diesel::pg::Pg>>::from_sql(bytes)?;
                value
                    .parse::<$name>()
                    .map_err(|e| e.to_string().into())
            }
        }
    };
}
