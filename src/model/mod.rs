use std::{
    borrow::{Borrow, BorrowMut},
    collections::BTreeMap,
    fmt::{self, Display},
    hash::Hash,
    io::Read,
    path::Path,
};

use serde::{de::DeserializeOwned, Deserialize, Serializer};

pub mod driver;
pub mod order;
pub mod stop;

/// Ingestion failure: missing column, unparseable coordinate, malformed
/// timestamp. The CLI maps this kind to its own exit code, so it is kept
/// as a concrete type inside the `anyhow` chain.
#[derive(Debug)]
pub struct InputSchemaError(pub String);

impl Display for InputSchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid input data: {}", self.0)
    }
}

impl std::error::Error for InputSchemaError {}

pub fn read_csv<T>(path: impl AsRef<Path>) -> anyhow::Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let reader = csv::Reader::from_path(path)
        .map_err(|e| InputSchemaError(format!("{}: {e}", path.display())))?;
    read_csv_records(reader, &path.display().to_string())
}

pub fn read_csv_from<T, R>(reader: R, source: &str) -> anyhow::Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    read_csv_records(csv::Reader::from_reader(reader), source)
}

fn read_csv_records<T, R>(mut reader: csv::Reader<R>, source: &str) -> anyhow::Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    let records: csv::Result<Vec<T>> = reader.deserialize().collect();
    Ok(records.map_err(|e| InputSchemaError(format!("{source}: {e}")))?)
}

pub fn parse_naive_time<'de, D>(deserializer: D) -> Result<chrono::NaiveTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    chrono::NaiveTime::parse_from_str(&s, "%H:%M:%S").map_err(serde::de::Error::custom)
}

pub fn serialize_naive_time<S>(time: &chrono::NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&time.format("%H:%M:%S").to_string())
}

/// Thin wrapper over the common map operations, so entity maps can expose
/// unchecked `gets` lookups for ids that are known to exist.
pub trait Map<K, V>: BorrowMut<MapType<K, V>> + Into<MapType<K, V>>
where
    K: Eq + Ord + 'static,
    V: 'static,
{
    fn gets<Q>(&self, key: &Q) -> &V
    where
        K: Borrow<Q> + Ord,
        Q: ?Sized + Hash + Eq + Ord,
    {
        self.borrow().get(key).expect("unchecked get failed")
    }

    fn gets_mut<Q>(&mut self, key: &Q) -> &mut V
    where
        K: Borrow<Q> + Ord,
        Q: ?Sized + Hash + Eq + Ord,
    {
        self.borrow_mut()
            .get_mut(key)
            .expect("unchecked get_mut failed")
    }

    fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q> + Ord,
        Q: ?Sized + Hash + Eq + Ord,
    {
        self.borrow().get(key)
    }

    fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q> + Ord,
        Q: ?Sized + Hash + Eq + Ord,
    {
        self.borrow().contains_key(key)
    }

    fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.borrow().iter()
    }

    fn keys(&self) -> impl Iterator<Item = &K> {
        self.borrow().keys()
    }

    fn values(&self) -> impl Iterator<Item = &V> {
        self.borrow().values()
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.borrow_mut().values_mut()
    }

    fn insert(&mut self, key: K, value: V) {
        self.borrow_mut().insert(key, value);
    }

    fn len(&self) -> usize {
        self.borrow().len()
    }

    fn is_empty(&self) -> bool {
        self.borrow().is_empty()
    }
}

pub type MapType<K, V> = BTreeMap<K, V>;

#[macro_export]
macro_rules! define_map {
    ($key:ty, $value:ty, $base:ident) => {
        #[derive(Debug, Default, Clone)]
        pub struct $base($crate::model::MapType<$key, $value>);

        impl std::borrow::Borrow<$crate::model::MapType<$key, $value>> for $base {
            fn borrow(&self) -> &$crate::model::MapType<$key, $value> {
                &self.0
            }
        }

        impl std::borrow::BorrowMut<$crate::model::MapType<$key, $value>> for $base {
            fn borrow_mut(&mut self) -> &mut $crate::model::MapType<$key, $value> {
                &mut self.0
            }
        }

        impl $crate::model::Map<$key, $value> for $base {}

        impl From<$crate::model::MapType<$key, $value>> for $base {
            fn from(map: $crate::model::MapType<$key, $value>) -> Self {
                Self(map)
            }
        }

        impl From<$base> for $crate::model::MapType<$key, $value> {
            fn from(base: $base) -> Self {
                base.0
            }
        }

        impl FromIterator<($key, $value)> for $base {
            fn from_iter<I: IntoIterator<Item = ($key, $value)>>(iter: I) -> Self {
                Self(iter.into_iter().collect())
            }
        }

        impl IntoIterator for $base {
            type Item = ($key, $value);
            type IntoIter =
                <$crate::model::MapType<$key, $value> as std::iter::IntoIterator>::IntoIter;

            fn into_iter(self) -> Self::IntoIter {
                self.0.into_iter()
            }
        }
    };
}
