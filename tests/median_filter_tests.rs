//! # Adaptive Median Filter Integration Tests
//!
//! Impulse noise removal, window estimation and scheduling independence.

#[cfg(test)]
mod tests {
    use adaptive_binarization::preprocessing::{
        adaptive_median_filter, adaptive_median_filter_cancellable, apply_adaptive_median_filter,
        estimate_noise, estimate_window_params, CancellationToken, GrayscaleImage,
        MedianWindowParams, PreprocessingError,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Horizontal gradient with a fraction of pixels replaced by 0 or 255
    fn salt_and_pepper(width: u32, height: u32, density: f64, seed: u64) -> (GrayscaleImage, GrayscaleImage) {
        let mut rng = StdRng::seed_from_u64(seed);
        let clean: Vec<u8> = (0..height)
            .flat_map(|_| (0..width).map(move |x| (60 + x * 100 / width) as u8))
            .collect();
        let noisy = clean
            .iter()
            .map(|&v| {
                if rng.random_bool(density) {
                    if rng.random_bool(0.5) {
                        0
                    } else {
                        255
                    }
                } else {
                    v
                }
            })
            .collect();
        (
            GrayscaleImage::new(width, height, clean).unwrap(),
            GrayscaleImage::new(width, height, noisy).unwrap(),
        )
    }

    fn impulse_count(img: &GrayscaleImage) -> usize {
        img.as_raw().iter().filter(|&&v| v == 0 || v == 255).count()
    }

    fn mean_abs_error(a: &GrayscaleImage, b: &GrayscaleImage) -> f64 {
        let total: u64 = a
            .as_raw()
            .iter()
            .zip(b.as_raw())
            .map(|(&x, &y)| x.abs_diff(y) as u64)
            .sum();
        total as f64 / a.len() as f64
    }

    #[test]
    fn test_single_salt_pixel_removed() {
        let mut data = vec![50u8; 15 * 15];
        data[7 * 15 + 7] = 255;
        let noisy = GrayscaleImage::new(15, 15, data).unwrap();

        let clean = adaptive_median_filter(&noisy, MedianWindowParams::new(3, 7).unwrap()).unwrap();
        assert!(clean.as_raw().iter().all(|&v| v == 50));
    }

    #[test]
    fn test_salt_and_pepper_noise_reduced() {
        let (clean, noisy) = salt_and_pepper(64, 48, 0.2, 17);
        let filtered = adaptive_median_filter(&noisy, MedianWindowParams::new(3, 11).unwrap()).unwrap();

        assert!(impulse_count(&filtered) * 20 < impulse_count(&noisy));
        assert!(mean_abs_error(&filtered, &clean) < mean_abs_error(&noisy, &clean) / 5.0);
    }

    #[test]
    fn test_step_edge_preserved() {
        // Left half 40, right half 200, with isolated impulses away from the edge
        let width = 32u32;
        let mut data: Vec<u8> = (0..width * width)
            .map(|i| if i % width < width / 2 { 40 } else { 200 })
            .collect();
        data[(5 * width + 4) as usize] = 255;
        data[(20 * width + 27) as usize] = 0;
        let img = GrayscaleImage::new(width, width, data).unwrap();

        let filtered = adaptive_median_filter(&img, MedianWindowParams::new(3, 7).unwrap()).unwrap();
        for y in 0..width {
            assert_eq!(filtered.get(15, y), Some(40), "left edge column at y={}", y);
            assert_eq!(filtered.get(16, y), Some(200), "right edge column at y={}", y);
        }
        assert_eq!(filtered.get(4, 5), Some(40));
        assert_eq!(filtered.get(27, 20), Some(200));
    }

    #[test]
    fn test_deterministic_across_thread_pools() {
        let (_, noisy) = salt_and_pepper(71, 53, 0.15, 99);
        let params = MedianWindowParams::new(3, 9).unwrap();

        let run = |threads: usize| {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap();
            pool.install(|| adaptive_median_filter(&noisy, params).unwrap())
        };

        let single = run(1);
        for threads in [2, 4, 7] {
            assert_eq!(run(threads), single, "output differs with {} threads", threads);
        }
    }

    #[test]
    fn test_cancelled_from_another_thread() {
        // Heavy noise keeps most pixels growing towards the largest window
        let (_, noisy) = salt_and_pepper(1200, 1200, 0.6, 3);
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(5));
                token.cancel();
            })
        };

        let result = adaptive_median_filter_cancellable(
            &noisy,
            MedianWindowParams::new(3, 31).unwrap(),
            &token,
        );
        canceller.join().unwrap();
        assert_eq!(result, Err(PreprocessingError::Cancelled));
    }

    #[test]
    fn test_uniform_image_estimate() {
        let flat = GrayscaleImage::filled(40, 30, 128).unwrap();
        assert_eq!(
            estimate_window_params(&flat),
            MedianWindowParams { min_size: 3, max_size: 7 }
        );
    }

    #[test]
    fn test_estimated_windows_are_odd_and_bounded() {
        for seed in 0..5 {
            let (_, noisy) = salt_and_pepper(48, 40, 0.05 * seed as f64, seed);
            let estimate = estimate_noise(&noisy);
            let window = estimate.window;
            assert_eq!(window.min_size, 3);
            assert!([7, 11, 15].contains(&window.max_size), "{:?}", window);
            assert!(estimate.edge_density >= 0.0 && estimate.edge_density <= 1.0);
            assert!(estimate.relative_noise.is_finite());
        }
    }

    #[test]
    fn test_apply_with_explicit_window() {
        let (_, noisy) = salt_and_pepper(24, 24, 0.1, 5);
        let window = MedianWindowParams::new(5, 9).unwrap();
        let result = apply_adaptive_median_filter(&noisy, Some(window)).unwrap();
        assert!(!result.estimated);
        assert_eq!(result.window, window);
        assert_eq!(result.image.dimensions(), (24, 24));
    }
}
