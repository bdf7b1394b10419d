use num::Num;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::SparseVec;

impl<N> Serialize for SparseVec<N>
where
    N: Num + Copy + Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("SparseVec", 3)?;
        state.serialize_field("len", &(self.len as u64))?;
        state.serialize_field("ind", &self.ind)?;
        state.serialize_field("val", &self.val)?;
        state.end()
    }
}

impl<'de, N> Deserialize<'de> for SparseVec<N>
where
    N: Num + Copy + Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as DeError;

        #[derive(Deserialize)]
        struct SparseVecData<N> {
            len: u64,
            ind: Vec<u32>,
            val: Vec<N>,
        }

        let data = SparseVecData::<N>::deserialize(deserializer)?;
        if data.ind.len() != data.val.len() {
            return Err(DeError::custom("SparseVec deserialize error: ind and val length mismatch"));
        }
        if !data.ind.windows(2).all(|w| w[0] < w[1]) {
            return Err(DeError::custom("SparseVec deserialize error: indices not strictly ascending"));
        }
        let len = data.len as usize;
        if data.ind.last().map_or(false, |&i| i as usize >= len) {
            return Err(DeError::custom("SparseVec deserialize error: index out of bounds"));
        }
        Ok(SparseVec::from_sorted_parts(len, data.ind, data.val))
    }
}
