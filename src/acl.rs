//! Stream ACL JSON shape, per ยง6: five optional keys (`$r`, `$w`, `$d`,
//! `$mr`, `$mw`), each either a single role string or an array of roles.
//! Absent keys mean "inherited/unset"; on the way out, a single role
//! serializes as a bare string and multiple roles as an array, and unset
//! fields are omitted entirely.

use serde::{de, ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One or more role names granted a permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRoles(pub Vec<String>);

impl AclRoles {
    pub fn single(role: impl Into<String>) -> Self {
        Self(vec![role.into()])
    }
}

impl Serialize for AclRoles {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.0.len() == 1 {
            serializer.serialize_str(&self.0[0])
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AclRoles {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RolesVisitor;

        impl<'de> de::Visitor<'de> for RolesVisitor {
            type Value = AclRoles;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a role name or an array of role names")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(AclRoles(vec![v.to_owned()]))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut roles = Vec::new();
                while let Some(role) = seq.next_element::<String>()? {
                    roles.push(role);
                }
                Ok(AclRoles(roles))
            }
        }

        deserializer.deserialize_any(RolesVisitor)
    }
}

/// Permissions on a single stream (or `$all`, or the system-wide default ACL).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamAcl {
    pub read: Option<AclRoles>,
    pub write: Option<AclRoles>,
    pub delete: Option<AclRoles>,
    pub metadata_read: Option<AclRoles>,
    pub metadata_write: Option<AclRoles>,
}

impl Serialize for StreamAcl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let present = [
            self.read.is_some(),
            self.write.is_some(),
            self.delete.is_some(),
            self.metadata_read.is_some(),
            self.metadata_write.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();

        let mut map = serializer.serialize_map(Some(present))?;
        if let Some(r) = &self.read {
            map.serialize_entry("$r", r)?;
        }
        if let Some(w) = &self.write {
            map.serialize_entry("$w", w)?;
        }
        if let Some(d) = &self.delete {
            map.serialize_entry("$d", d)?;
        }
        if let Some(mr) = &self.metadata_read {
            map.serialize_entry("$mr", mr)?;
        }
        if let Some(mw) = &self.metadata_write {
            map.serialize_entry("$mw", mw)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StreamAcl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AclVisitor;

        impl<'de> de::Visitor<'de> for AclVisitor {
            type Value = StreamAcl;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a stream ACL object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut acl = StreamAcl::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "$r" => acl.read = Some(map.next_value()?),
                        "$w" => acl.write = Some(map.next_value()?),
                        "$d" => acl.delete = Some(map.next_value()?),
                        "$mr" => acl.metadata_read = Some(map.next_value()?),
                        "$mw" => acl.metadata_write = Some(map.next_value()?),
                        _ => {
                            let _ignored: de::IgnoredAny = map.next_value()?;
                        }
                    }
                }
                Ok(acl)
            }
        }

        deserializer.deserialize_map(AclVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_role_serializes_as_bare_string() {
        let acl = StreamAcl { read: Some(AclRoles::single("admin")), ..Default::default() };
        let json = serde_json::to_string(&acl).unwrap();
        assert_eq!(json, r#"{"$r":"admin"}"#);
    }

    #[test]
    fn multiple_roles_serialize_as_array() {
        let acl = StreamAcl {
            write: Some(AclRoles(vec!["admin".into(), "ops".into()])),
            ..Default::default()
        };
        let json = serde_json::to_string(&acl).unwrap();
        assert_eq!(json, r#"{"$w":["admin","ops"]}"#);
    }

    #[test]
    fn unset_fields_are_omitted() {
        let acl = StreamAcl::default();
        assert_eq!(serde_json::to_string(&acl).unwrap(), "{}");
    }

    #[test]
    fn round_trip_through_both_encodings() {
        let single: StreamAcl = serde_json::from_str(r#"{"$r":"admin"}"#).unwrap();
        assert_eq!(single.read, Some(AclRoles::single("admin")));

        let array: StreamAcl = serde_json::from_str(r#"{"$r":["admin","ops"]}"#).unwrap();
        assert_eq!(array.read, Some(AclRoles(vec!["admin".into(), "ops".into()])));

        let reserialized = serde_json::to_string(&single).unwrap();
        let reparsed: StreamAcl = serde_json::from_str(&reserialized).unwrap();
        assert_eq!(reparsed, single);
    }
}
