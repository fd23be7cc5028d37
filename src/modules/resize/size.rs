/// Width in pixels for a size label. Unknown labels map to 0, which the
/// renderer rejects.
pub fn resolve(label: &str) -> u32 {
    match label {
        "xl" => 1920,
        "lg" => 800,
        "md" => 460,
        "sm" => 380,
        "xs" => 160,
        _ => 0,
    }
}
