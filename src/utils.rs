use web_sys::js_sys;

/// Milliseconds since the Unix epoch, from the host clock. The core never
/// reads this itself; commands carry the timestamp in.
pub fn now_ms() -> f64 {
    js_sys::Date::now()
}
