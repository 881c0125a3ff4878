/// Clamp that accepts its bounds in either order.
pub trait Clampable {
    fn clamp_num(self, a: Self, b: Self) -> Self;
}

impl Clampable for f32 {
    fn clamp_num(self, a: f32, b: f32) -> f32 {
        if a <= b {
            self.clamp(a, b)
        } else {
            self.clamp(b, a)
        }
    }
}

/// `in_min` must differ from `in_max`.
pub fn remap_range(
    value: f32,
    in_min: f32,
    in_max: f32,
    out_min: f32,
    out_max: f32,
    clamp_result: bool,
) -> f32 {
    debug_assert!(in_min != in_max, "remap input range must not be empty");
    let remapped = out_min + (value - in_min) / (in_max - in_min) * (out_max - out_min);
    if clamp_result {
        remapped.clamp_num(out_min, out_max)
    } else {
        remapped
    }
}
