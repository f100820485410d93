use falltrack::hungarian::HungarianSolver;
use ndarray::{array, Array2};

fn main() {
    println!("Testing the Hungarian assignment solver...");

    // Rectangular minimization: one row more than there are columns.
    let cost = array![
        [5.0, 10.0, 15.0, 20.0],
        [15.0, 20.0, 30.0, 10.0],
        [10.0, 20.0, 15.0, 30.0],
        [20.0, 10.0, 10.0, 45.0],
        [50.0, 50.0, 50.0, 50.0],
    ];

    let result = HungarianSolver::solve(cost.view(), false);
    println!("Assignment: {:?}", result.assignment);
    println!("Reversed:   {:?}", result.assignment_reversed);
    println!("Total cost: {}", result.total_cost);

    // IoU-style maximization, the mode the tracker uses.
    let iou = array![[0.8, 0.1, 0.0], [0.2, 0.7, 0.1]];
    let best = HungarianSolver::solve(iou.view(), true);
    println!("\nIoU assignment: {:?}", best.assignment);
    println!("Total IoU: {}", best.total_cost);

    // Timing on a larger matrix.
    let large = Array2::from_shape_fn((80, 80), |(i, j)| ((i * 7 + j * 13) % 100) as f32 / 10.0);
    let start = std::time::Instant::now();
    let large_result = HungarianSolver::solve(large.view(), false);
    println!(
        "\n80x80 matrix solved in {:?} (total cost {})",
        start.elapsed(),
        large_result.total_cost
    );
}
