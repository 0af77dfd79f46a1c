mod layer_ops;
mod visualization;
