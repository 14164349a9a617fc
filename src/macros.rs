#[macro_export]
macro_rules! assert_f64_approx {
    ($l:expr, $r:expr) => {
        assert_f64_approx!($l, $r, 1e-9)
    };
    ($l:expr, $r:expr, $eps:expr) => {{
        let (l, r): (f64, f64) = ($l, $r);
        assert!((l - r).abs() < $eps, "{l} !~ {r} (eps {})", $eps);
    }};
}

#[macro_export]
macro_rules! assert_slice_approx {
    ($l:expr, $r:expr) => {{
        let (l, r) = (&$l, &$r);
        assert_eq!(l.len(), r.len(), "slice lengths differ");
        for (i, (a, b)) in l.iter().zip(r.iter()).enumerate() {
            assert!((a - b).abs() < 1e-9, "slices differ at {i}: {a} !~ {b}");
        }
    }};
}
