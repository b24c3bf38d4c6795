//! # 晶体取向模型
//!
//! 以实空间晶格向量 a, b, c 与空间群符号描述一颗晶体，
//! 并提供模拟引擎需要的 A 矩阵与随机取向。
//!
//! ## 约定
//! - 实空间矩阵按行存放 a, b, c
//! - dxtbx A = UB，其列为倒易向量 a*, b*, c*，因此 A = M⁻¹
//! - 引擎格式为 Aᵀ 的行主序展开（行为 a*, b*, c*）
//!
//! ## 依赖关系
//! - 被 `sim/`, `parsers/hkl.rs`, `commands/simulate.rs` 使用
//! - 使用 `models/linalg.rs`
//! - 使用 `rand` 生成可复现的随机取向

use crate::error::{PanelsimError, Result};
use crate::models::linalg::{self, Mat3, Vec3};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 晶格（实空间）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c（Å）
    pub matrix: Mat3,
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let cos_gamma = gamma.to_radians().cos();
        let sin_gamma = gamma.to_radians().sin();

        let a_vec = [a, 0.0, 0.0];
        let b_vec = [b * cos_gamma, b * sin_gamma, 0.0];

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();

        Lattice {
            matrix: [a_vec, b_vec, [c1, c2, c3]],
        }
    }

    pub fn from_vectors(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Lattice { matrix: [a, b, c] }
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a_vec, b_vec, c_vec] = self.matrix;

        let a = linalg::norm(a_vec);
        let b = linalg::norm(b_vec);
        let c = linalg::norm(c_vec);

        let alpha = linalg::angle(b_vec, c_vec).to_degrees();
        let beta = linalg::angle(a_vec, c_vec).to_degrees();
        let gamma = linalg::angle(a_vec, b_vec).to_degrees();

        (a, b, c, alpha, beta, gamma)
    }

    /// 晶胞体积 (Å³)
    pub fn volume(&self) -> f64 {
        linalg::determinant(&self.matrix).abs()
    }
}

/// 晶体：晶格 + 空间群
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crystal {
    pub lattice: Lattice,
    /// Hermann–Mauguin 符号，如 "P43212"
    pub space_group: String,
}

impl Crystal {
    pub fn new(real_a: Vec3, real_b: Vec3, real_c: Vec3, space_group: impl Into<String>) -> Self {
        Crystal {
            lattice: Lattice::from_vectors(real_a, real_b, real_c),
            space_group: space_group.into(),
        }
    }

    pub fn unit_cell_volume(&self) -> f64 {
        self.lattice.volume()
    }

    /// dxtbx A 矩阵（列为 a*, b*, c*）
    pub fn a_matrix(&self) -> Result<Mat3> {
        linalg::inverse(&self.lattice.matrix).ok_or_else(|| {
            PanelsimError::InvalidCrystal("Real-space basis is singular".to_string())
        })
    }

    /// 模拟引擎使用的 A 矩阵（行主序展开的 Aᵀ）
    pub fn a_matrix_for_engine(&self) -> Result<[f64; 9]> {
        if self.space_group.trim().to_uppercase().starts_with('C') {
            return Err(PanelsimError::InvalidCrystal(format!(
                "Space group '{}' is C-centred; convert the crystal model to its primitive setting first",
                self.space_group
            )));
        }

        let at = linalg::transpose(&self.a_matrix()?);
        let mut flat = [0.0; 9];
        for (i, row) in at.iter().enumerate() {
            flat[i * 3..i * 3 + 3].copy_from_slice(row);
        }
        Ok(flat)
    }

    /// 旋转实空间基矢：每行 a' = R·a，即 M' = M·Rᵀ
    pub fn rotated(&self, rotation: &Mat3) -> Self {
        Crystal {
            lattice: Lattice {
                matrix: linalg::mat_mul(&self.lattice.matrix, &linalg::transpose(rotation)),
            },
            space_group: self.space_group.clone(),
        }
    }
}

/// 单位四元数 (x, y, z, w) 转旋转矩阵
pub fn quaternion_to_matrix(q: [f64; 4]) -> Mat3 {
    let [x, y, z, w] = q;
    [
        [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - z * w),
            2.0 * (x * z + y * w),
        ],
        [
            2.0 * (x * y + z * w),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - x * w),
        ],
        [
            2.0 * (x * z - y * w),
            2.0 * (y * z + x * w),
            1.0 - 2.0 * (x * x + y * y),
        ],
    ]
}

/// 生成 n 个均匀分布于 SO(3) 的随机旋转（Shoemake 方法），相同种子结果相同
pub fn random_rotations(n: usize, seed: u64) -> Vec<Mat3> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..n)
        .map(|_| {
            let u1: f64 = rng.gen();
            let u2: f64 = rng.gen();
            let u3: f64 = rng.gen();

            let q = [
                (1.0 - u1).sqrt() * (2.0 * PI * u2).sin(),
                (1.0 - u1).sqrt() * (2.0 * PI * u2).cos(),
                u1.sqrt() * (2.0 * PI * u3).sin(),
                u1.sqrt() * (2.0 * PI * u3).cos(),
            ];
            quaternion_to_matrix(q)
        })
        .collect()
}
