use std::fmt;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// Scalar component kind of a reflected uniform.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ScalarKind {
    Float,
    Sint,
    Uint,
    Bool,
}

/// Shape of a reflected uniform, enough to encode a [`UniformValue`] into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniformType {
    Scalar(ScalarKind),
    Vector { kind: ScalarKind, size: u8 },
    Matrix { columns: u8, rows: u8 },
    Array { element: Box<UniformType>, count: u32, stride: u32 },
    /// Whole uniform block; only its members are writable.
    Struct,
    Opaque,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScalarKind::Float => "f32",
            ScalarKind::Sint => "i32",
            ScalarKind::Uint => "u32",
            ScalarKind::Bool => "bool",
        })
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformType::Scalar(kind) => write!(f, "{kind}"),
            UniformType::Vector { kind, size } => write!(f, "vec{size}<{kind}>"),
            UniformType::Matrix { columns, rows } => write!(f, "mat{columns}x{rows}<f32>"),
            UniformType::Array { element, count, .. } => write!(f, "array<{element}, {count}>"),
            UniformType::Struct => f.write_str("struct"),
            UniformType::Opaque => f.write_str("opaque"),
        }
    }
}

/// Where a named uniform lives: the uniform buffer binding and the byte
/// range inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLocation {
    pub group: u32,
    pub binding: u32,
    pub offset: u32,
    pub size: u32,
    pub ty: UniformType,
}

/// A value that can be written into a uniform.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Uint(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    FloatArray(Vec<f32>),
    Vec4Array(Vec<Vec4>),
}

impl UniformValue {
    fn kind_name(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "f32",
            UniformValue::Int(_) => "i32",
            UniformValue::Uint(_) => "u32",
            UniformValue::Vec2(_) => "vec2<f32>",
            UniformValue::Vec3(_) => "vec3<f32>",
            UniformValue::Vec4(_) => "vec4<f32>",
            UniformValue::Mat3(_) => "mat3x3<f32>",
            UniformValue::Mat4(_) => "mat4x4<f32>",
            UniformValue::FloatArray(_) => "array<f32>",
            UniformValue::Vec4Array(_) => "array<vec4<f32>>",
        }
    }

    /// Encodes the value into `dst`, which covers exactly the uniform's byte
    /// range. Follows WGSL uniform layout (mat3 columns padded to 16 bytes).
    pub(crate) fn encode(&self, ty: &UniformType, dst: &mut [u8]) -> Result<(), String> {
        use ScalarKind as K;
        use UniformType as T;
        use UniformValue as V;

        match (self, ty) {
            (V::Float(v), T::Scalar(K::Float)) => put(dst, 0, bytemuck::bytes_of(v)),
            (V::Int(v), T::Scalar(K::Float)) => put(dst, 0, bytemuck::bytes_of(&(*v as f32))),
            (V::Int(v), T::Scalar(K::Sint)) => put(dst, 0, bytemuck::bytes_of(v)),
            (V::Uint(v), T::Scalar(K::Uint)) => put(dst, 0, bytemuck::bytes_of(v)),
            (V::Int(v), T::Scalar(K::Uint)) if *v >= 0 => put(dst, 0, bytemuck::bytes_of(&(*v as u32))),
            (V::Uint(v), T::Scalar(K::Sint)) if *v <= i32::MAX as u32 => {
                put(dst, 0, bytemuck::bytes_of(&(*v as i32)))
            }
            (V::Vec2(v), T::Vector { kind: K::Float, size: 2 }) => {
                put(dst, 0, bytemuck::cast_slice(&v.to_array()))
            }
            (V::Vec3(v), T::Vector { kind: K::Float, size: 3 }) => {
                put(dst, 0, bytemuck::cast_slice(&v.to_array()))
            }
            (V::Vec4(v), T::Vector { kind: K::Float, size: 4 }) => {
                put(dst, 0, bytemuck::cast_slice(&v.to_array()))
            }
            (V::Mat4(m), T::Matrix { columns: 4, rows: 4 }) => {
                put(dst, 0, bytemuck::cast_slice(&m.to_cols_array()))
            }
            (V::Mat3(m), T::Matrix { columns: 3, rows: 3 }) => {
                for (i, column) in [m.x_axis, m.y_axis, m.z_axis].iter().enumerate() {
                    put(dst, i * 16, bytemuck::cast_slice(&column.to_array()))?;
                }
                Ok(())
            }
            (V::FloatArray(values), T::Array { element, count, stride })
                if **element == T::Scalar(K::Float) =>
            {
                check_len(values.len(), *count)?;
                for (i, v) in values.iter().enumerate() {
                    put(dst, i * *stride as usize, bytemuck::bytes_of(v))?;
                }
                Ok(())
            }
            (V::Vec4Array(values), T::Array { element, count, stride })
                if **element == (T::Vector { kind: K::Float, size: 4 }) =>
            {
                check_len(values.len(), *count)?;
                for (i, v) in values.iter().enumerate() {
                    put(dst, i * *stride as usize, bytemuck::cast_slice(&v.to_array()))?;
                }
                Ok(())
            }
            _ => Err(format!("cannot write {} into a {ty} uniform", self.kind_name())),
        }
    }
}

fn put(dst: &mut [u8], offset: usize, bytes: &[u8]) -> Result<(), String> {
    let end = offset + bytes.len();
    let Some(slot) = dst.get_mut(offset..end) else {
        return Err(format!("write ending at byte {end} overflows the uniform"));
    };
    slot.copy_from_slice(bytes);
    Ok(())
}

fn check_len(len: usize, count: u32) -> Result<(), String> {
    if len > count as usize {
        return Err(format!("{len} elements do not fit an array of {count}"));
    }
    Ok(())
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for UniformValue {
            fn from(v: $ty) -> Self {
                UniformValue::$variant(v)
            }
        })*
    };
}

impl_from! {
    f32 => Float,
    i32 => Int,
    u32 => Uint,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat3 => Mat3,
    Mat4 => Mat4,
    Vec<f32> => FloatArray,
    Vec<Vec4> => Vec4Array,
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(Vec2::from_array(v))
    }
}

/// CPU staging copy of one uniform buffer binding.
///
/// Writes land here; [`take_dirty`](Self::take_dirty) yields the bytes only
/// when they differ from the last upload.
#[derive(Debug, Clone)]
pub(crate) struct UniformBlock {
    pub group: u32,
    pub binding: u32,
    data: Vec<u8>,
    uploaded: Option<Vec<u8>>,
}

impl UniformBlock {
    pub fn new(group: u32, binding: u32, size: u32) -> Self {
        Self {
            group,
            binding,
            data: vec![0; size as usize],
            uploaded: None,
        }
    }

    #[cfg(test)]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn write(&mut self, loc: &UniformLocation, value: &UniformValue) -> Result<(), String> {
        let start = loc.offset as usize;
        let end = start + loc.size as usize;
        let Some(dst) = self.data.get_mut(start..end) else {
            return Err(format!("range {start}..{end} is outside its block"));
        };
        value.encode(&loc.ty, dst)
    }

    pub fn take_dirty(&mut self) -> Option<&[u8]> {
        if self.uploaded.as_deref() == Some(self.data.as_slice()) {
            return None;
        }
        self.uploaded = Some(self.data.clone());
        Some(&self.data)
    }

    /// Forces the next [`take_dirty`](Self::take_dirty) to yield, e.g. after
    /// the GPU buffer was recreated.
    pub fn invalidate(&mut self) {
        self.uploaded = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(offset: u32, size: u32, ty: UniformType) -> UniformLocation {
        UniformLocation {
            group: 0,
            binding: 1,
            offset,
            size,
            ty,
        }
    }

    #[test]
    fn float_lands_at_offset() {
        let mut block = UniformBlock::new(0, 1, 16);
        block
            .write(&loc(4, 4, UniformType::Scalar(ScalarKind::Float)), &0.5f32.into())
            .unwrap();
        assert_eq!(&block.bytes()[4..8], &0.5f32.to_ne_bytes());
        assert!(block.bytes()[..4].iter().all(|&b| b == 0));
    }

    #[test]
    fn mat3_columns_are_padded() {
        let mut dst = [0u8; 48];
        let m = Mat3::from_cols_array(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        UniformValue::Mat3(m)
            .encode(&UniformType::Matrix { columns: 3, rows: 3 }, &mut dst)
            .unwrap();
        let floats: &[f32] = bytemuck::cast_slice(&dst);
        assert_eq!(&floats[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&floats[4..7], &[4.0, 5.0, 6.0]);
        assert_eq!(&floats[8..11], &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn arrays_follow_stride() {
        let ty = UniformType::Array {
            element: Box::new(UniformType::Scalar(ScalarKind::Float)),
            count: 4,
            stride: 16,
        };
        let mut dst = [0u8; 64];
        UniformValue::FloatArray(vec![1.0, 2.0]).encode(&ty, &mut dst).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(&dst);
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[4], 2.0);
        assert_eq!(floats[8], 0.0);
    }

    #[test]
    fn oversized_array_is_rejected() {
        let ty = UniformType::Array {
            element: Box::new(UniformType::Scalar(ScalarKind::Float)),
            count: 2,
            stride: 4,
        };
        let mut dst = [0u8; 8];
        assert!(UniformValue::FloatArray(vec![0.0; 3]).encode(&ty, &mut dst).is_err());
    }

    #[test]
    fn type_mismatch_is_reported() {
        let mut dst = [0u8; 64];
        let err = UniformValue::Vec3(Vec3::ONE)
            .encode(&UniformType::Matrix { columns: 4, rows: 4 }, &mut dst)
            .unwrap_err();
        assert!(err.contains("vec3<f32>"));
        assert!(err.contains("mat4x4<f32>"));
    }

    #[test]
    fn int_coerces_into_float_scalar() {
        let mut dst = [0u8; 4];
        UniformValue::Int(3)
            .encode(&UniformType::Scalar(ScalarKind::Float), &mut dst)
            .unwrap();
        assert_eq!(f32::from_ne_bytes(dst), 3.0);
    }

    #[test]
    fn negative_int_does_not_fit_uint() {
        let mut dst = [0u8; 4];
        assert!(UniformValue::Int(-1)
            .encode(&UniformType::Scalar(ScalarKind::Uint), &mut dst)
            .is_err());
    }

    #[test]
    fn take_dirty_only_yields_changes() {
        let float = loc(0, 4, UniformType::Scalar(ScalarKind::Float));
        let mut block = UniformBlock::new(0, 0, 4);
        assert!(block.take_dirty().is_some());
        assert!(block.take_dirty().is_none());

        block.write(&float, &1.0f32.into()).unwrap();
        assert!(block.take_dirty().is_some());

        block.write(&float, &1.0f32.into()).unwrap();
        assert!(block.take_dirty().is_none());

        block.invalidate();
        assert!(block.take_dirty().is_some());
    }
}
