//! # 衍射强度标度
//!
//! 由光斑尺寸、晶体尺寸和镶嵌块体积估计被照射的镶嵌块数目，
//! 以及每个镶嵌块沿各轴的晶胞数。

/// 被照亮的镶嵌块数目（近似）
///
/// 光斑不大于晶体时照射体积为 `crystal·beam²`，否则为 `crystal³`。
/// 体积单位 mm³，镶嵌块体积单位 Å³，1 mm³ = 1e21 Å³。
pub fn determine_spot_scale(beam_size_mm: f64, crystal_size_mm: f64, mosaic_vol_a3: f64) -> f64 {
    let illuminated = if beam_size_mm <= crystal_size_mm {
        crystal_size_mm * beam_size_mm * beam_size_mm
    } else {
        crystal_size_mm.powi(3)
    };
    illuminated / mosaic_vol_a3 * 1e21
}

/// 每个镶嵌块沿 a、b、c 的晶胞数
pub fn ncells(mosaic_vol_a3: f64, cell_volume_a3: f64) -> usize {
    (mosaic_vol_a3 / cell_volume_a3).cbrt().floor() as usize
}
