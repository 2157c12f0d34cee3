use bitflags::bitflags;

bitflags! {
    /// Wiki permission bitmask. These values are persisted, so existing bits
    /// must never change and new ones must exceed the current maximum.
    pub struct Permissions: u64 {
        const VIEW               = 1;
        const RENAME             = 2;
        const EDIT               = 4;
        const CREATE             = 8;
        const DELETE             = 16;
        const MANAGE_PERMISSIONS = 32;
        const MANAGE_BINDINGS    = 64;
    }
}

impl Permissions {
    /// The preset granted to `@everyone` when a guild has no explicit setup.
    pub const DEFAULT: Permissions = Permissions::CREATE
        .union(Permissions::VIEW)
        .union(Permissions::RENAME)
        .union(Permissions::EDIT);

    /// User-facing names of the individual flags set in `self`, in bit order.
    /// Composite presets are not reported.
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for (flag, name) in [
            (Permissions::VIEW, "view"),
            (Permissions::RENAME, "rename"),
            (Permissions::EDIT, "edit"),
            (Permissions::CREATE, "create"),
            (Permissions::DELETE, "delete"),
            (Permissions::MANAGE_PERMISSIONS, "manage permissions"),
            (Permissions::MANAGE_BINDINGS, "manage bindings"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        names
    }

    /// Parse a single user-supplied permission name. Accepts `-` for `_` and
    /// the `default` and `none` presets.
    pub fn from_name(name: &str) -> Option<Permissions> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "view" => Some(Permissions::VIEW),
            "rename" => Some(Permissions::RENAME),
            "edit" => Some(Permissions::EDIT),
            "create" => Some(Permissions::CREATE),
            "delete" => Some(Permissions::DELETE),
            "manage_permissions" => Some(Permissions::MANAGE_PERMISSIONS),
            "manage_bindings" => Some(Permissions::MANAGE_BINDINGS),
            "default" => Some(Permissions::DEFAULT),
            "none" => Some(Permissions::empty()),
            _ => None,
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::empty()
    }
}

impl serde::Serialize for Permissions {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Permissions {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u64::deserialize(deserializer)?;
        Ok(Permissions::from_bits_truncate(bits))
    }
}

#[cfg(feature = "sqlx")]
mod sqlx_impls {
    use super::Permissions;
    use sqlx::encode::IsNull;
    use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
    use sqlx::{Decode, Encode, Postgres, Type};

    impl Type<Postgres> for Permissions {
        fn type_info() -> PgTypeInfo {
            <i64 as Type<Postgres>>::type_info()
        }

        fn compatible(ty: &PgTypeInfo) -> bool {
            <i64 as Type<Postgres>>::compatible(ty)
        }
    }

    impl Encode<'_, Postgres> for Permissions {
        fn encode_by_ref(
            &self,
            buf: &mut PgArgumentBuffer,
        ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
            <i64 as Encode<'_, Postgres>>::encode_by_ref(&(self.bits() as i64), buf)
        }
    }

    impl<'r> Decode<'r, Postgres> for Permissions {
        fn decode(
            value: PgValueRef<'r>,
        ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
            let val = <i64 as Decode<'r, Postgres>>::decode(value)?;
            Ok(Permissions::from_bits_truncate(val as u64))
        }
    }
}

/// OR-fold a member's role bitmasks into their guild-wide base permissions.
pub fn resolve(role_permissions: &[Permissions]) -> Permissions {
    let mut result = Permissions::empty();
    for &perm in role_permissions {
        result |= perm;
    }
    result
}

/// Join names the way a sentence would: `a`, `a and b`, `a, b, and c`.
pub fn natural_join(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, second] => format!("{first} and {second}"),
        [head @ .., last] => format!("{}, and {last}", head.join(", ")),
    }
}
